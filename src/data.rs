use burn::{
    data::{dataloader::batcher::Batcher, dataset::vision::MnistItem},
    prelude::*,
};

use crate::dataset::{HEIGHT, WIDTH};
use crate::error::{Error, Result};

/// Scale a raw `0..=255` pixel to `[0, 1]`.
pub fn normalize(pixel: f32) -> f32 {
    pixel / 255.0
}

/// Number of classes spanned by `labels`, i.e. the largest label plus one.
pub fn num_classes(labels: &[u8]) -> usize {
    labels
        .iter()
        .max()
        .map(|label| *label as usize + 1)
        .unwrap_or(0)
}

/// One-hot encode `labels` as a row-major `[labels.len(), num_classes]` matrix.
pub fn to_categorical(labels: &[u8], num_classes: usize) -> Result<Vec<f32>> {
    match encode(labels, num_classes) {
        (encoded, None) => Ok(encoded),
        (_, Some(label)) => Err(Error::LabelOutOfRange { label, num_classes }),
    }
}

/// Encode what fits, reporting the first label outside `0..num_classes`.
fn encode(labels: &[u8], num_classes: usize) -> (Vec<f32>, Option<u8>) {
    let mut encoded = vec![0.0; labels.len() * num_classes];
    let mut invalid = None;

    for (row, label) in labels.iter().enumerate() {
        let index = *label as usize;
        if index < num_classes {
            encoded[row * num_classes + index] = 1.0;
        } else if invalid.is_none() {
            invalid = Some(*label);
        }
    }

    (encoded, invalid)
}

#[derive(Clone, Debug)]
pub struct MnistBatcher<B: Backend> {
    device: B::Device,
    num_classes: usize,
}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Normalized images, `[batch_size, height, width]`.
    pub images: Tensor<B, 3>,
    /// Class indices, `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
    /// One-hot targets, `[batch_size, num_classes]`.
    pub one_hot: Tensor<B, 2>,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(device: B::Device, num_classes: usize) -> Self {
        Self {
            device,
            num_classes,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Stack raw images into a normalized `[count, height, width]` tensor.
pub fn images_tensor<'a, B: Backend>(
    images: impl ExactSizeIterator<Item = &'a [[f32; WIDTH]; HEIGHT]>,
    device: &B::Device,
) -> Tensor<B, 3> {
    let count = images.len();
    let pixels = images
        .flat_map(|image| image.iter().flatten().copied().map(normalize))
        .collect::<Vec<f32>>();
    let data = TensorData::new(pixels, [count, HEIGHT, WIDTH]);

    Tensor::from_data(data.convert::<B::FloatElem>(), device)
}

impl<B: Backend> Batcher<MnistItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>) -> MnistBatch<B> {
        let images = images_tensor(items.iter().map(|item| &item.image), &self.device);

        let labels = items.iter().map(|item| item.label).collect::<Vec<_>>();
        // Out of range labels keep an all-zero row, which adds nothing to the loss.
        let (encoded, invalid) = encode(&labels, self.num_classes);
        if let Some(label) = invalid {
            log::warn!("Label {label} is out of range for {} classes", self.num_classes);
        }

        let targets = TensorData::new(
            labels.iter().map(|label| *label as i64).collect::<Vec<_>>(),
            [labels.len()],
        );
        let one_hot = TensorData::new(encoded, [labels.len(), self.num_classes]);

        MnistBatch {
            images,
            targets: Tensor::from_data(targets.convert::<B::IntElem>(), &self.device),
            one_hot: Tensor::from_data(one_hot.convert::<B::FloatElem>(), &self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn item(label: u8, value: f32) -> MnistItem {
        MnistItem {
            image: [[value; WIDTH]; HEIGHT],
            label,
        }
    }

    #[test]
    fn one_hot_rows_match_labels() {
        let encoded = to_categorical(&[2, 0, 1], 3).unwrap();

        assert_eq!(
            encoded,
            vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn one_hot_keeps_leading_dimension() {
        let labels = [7, 2, 1, 0, 4, 1, 4, 9, 5, 9];
        let encoded = to_categorical(&labels, num_classes(&labels)).unwrap();

        assert_eq!(encoded.len(), labels.len() * 10);
        for row in encoded.chunks(10) {
            assert_eq!(row.iter().sum::<f32>(), 1.0);
        }
    }

    #[test]
    fn one_hot_rejects_out_of_range_label() {
        let err = to_categorical(&[1, 10], 10).unwrap_err();

        assert!(matches!(
            err,
            Error::LabelOutOfRange {
                label: 10,
                num_classes: 10
            }
        ));
    }

    #[test]
    fn num_classes_is_max_label_plus_one() {
        assert_eq!(num_classes(&[3, 9, 0]), 10);
        assert_eq!(num_classes(&[]), 0);
    }

    #[test]
    fn batch_normalizes_images_to_unit_range() {
        let device = Default::default();
        let batcher = MnistBatcher::<TestBackend>::new(device, 10);

        let batch = batcher.batch(vec![item(3, 255.0), item(7, 0.0), item(1, 51.0)]);

        assert_eq!(batch.images.dims(), [3, HEIGHT, WIDTH]);
        assert_eq!(batch.targets.dims(), [3]);
        assert_eq!(batch.one_hot.dims(), [3, 10]);

        let max = batch.images.clone().max().into_scalar();
        let min = batch.images.clone().min().into_scalar();
        assert_eq!(max, 1.0);
        assert_eq!(min, 0.0);

        let third = batch
            .images
            .slice([2..3, 0..1, 0..1])
            .into_scalar();
        assert!((third - 0.2).abs() < 1e-6);
    }

    #[test]
    fn batch_targets_and_one_hot_agree() {
        let device = Default::default();
        let batcher = MnistBatcher::<TestBackend>::new(device, 10);

        let batch = batcher.batch(vec![item(3, 1.0), item(9, 1.0)]);

        let targets = batch.targets.to_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![3, 9]);

        let argmax = batch
            .one_hot
            .argmax(1)
            .squeeze::<1>(1)
            .to_data()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(argmax, targets);
    }
}
