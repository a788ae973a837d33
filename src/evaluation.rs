use std::fmt;

use burn::{data::dataloader::DataLoader, prelude::*, tensor::ElementConversion};

use crate::data::MnistBatch;
use crate::model::Lenet;

/// Loss and accuracy of a model over a whole split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean categorical cross-entropy per item.
    pub loss: f64,
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    /// Percentage of correctly classified items, in `[0, 100]`.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.correct as f64 / self.total as f64
    }

    pub fn errors(&self) -> usize {
        self.total - self.correct
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Accuracy: {:.2}%", self.accuracy())
    }
}

/// Number of rows of `output` whose argmax equals `targets`.
pub fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    output
        .argmax(1)
        .squeeze::<1>(1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

pub fn evaluate<B: Backend>(
    model: &Lenet<B>,
    loader: &dyn DataLoader<MnistBatch<B>>,
) -> Evaluation {
    let mut loss = 0.0;
    let mut correct = 0;
    let mut total = 0;

    for batch in loader.iter() {
        let [batch_size, _, _] = batch.images.dims();
        let item = model.forward_classification(batch);

        loss += item.loss.into_scalar().elem::<f64>() * batch_size as f64;
        correct += count_correct(item.output, item.targets);
        total += batch_size;
    }

    let loss = if total == 0 { 0.0 } else { loss / total as f64 };
    log::info!("Evaluated {total} items: {correct} correct, loss {loss:.4}");

    Evaluation {
        loss,
        correct,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MnistBatcher;
    use crate::dataset::IdxDataset;
    use crate::idx::IdxImages;
    use crate::model::LenetConfig;
    use burn::backend::NdArray;
    use burn::data::dataloader::DataLoaderBuilder;

    type TestBackend = NdArray;

    #[test]
    fn accuracy_is_a_percentage() {
        let evaluation = Evaluation {
            loss: 0.3,
            correct: 9,
            total: 12,
        };

        assert_eq!(evaluation.accuracy(), 75.0);
        assert_eq!(evaluation.errors(), 3);
        assert_eq!(evaluation.to_string(), "Accuracy: 75.00%");
    }

    #[test]
    fn empty_evaluation_has_zero_accuracy() {
        let evaluation = Evaluation {
            loss: 0.0,
            correct: 0,
            total: 0,
        };

        assert_eq!(evaluation.accuracy(), 0.0);
    }

    #[test]
    fn counts_argmax_matches() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 2>::from_floats(
            [[0.9, 0.1], [0.2, 0.8], [0.6, 0.4]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1], &device);

        assert_eq!(count_correct(output, targets), 2);
    }

    #[test]
    fn evaluates_every_item_of_the_loader() {
        let device = Default::default();
        let images = IdxImages {
            rows: 28,
            cols: 28,
            pixels: (0..7 * 784).map(|i| (i * 31 % 256) as u8).collect(),
        };
        let dataset = IdxDataset::new(images, vec![0, 1, 2, 3, 4, 5, 6]).unwrap();
        let model = LenetConfig::new().init::<TestBackend>(&device).unwrap();
        let loader = DataLoaderBuilder::new(MnistBatcher::<TestBackend>::new(device, 10))
            .batch_size(3)
            .build(dataset);

        let evaluation = evaluate(&model, loader.as_ref());

        assert_eq!(evaluation.total, 7);
        assert!(evaluation.correct <= 7);
        assert!((0.0..=100.0).contains(&evaluation.accuracy()));
        assert!(evaluation.loss.is_finite() && evaluation.loss > 0.0);
    }
}
