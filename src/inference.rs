use std::fmt;
use std::time::{Duration, Instant};

use burn::{data::dataloader::DataLoader, prelude::*};

use crate::data::{images_tensor, MnistBatch};
use crate::dataset::{HEIGHT, WIDTH};
use crate::error::{Error, Result};
use crate::evaluation::count_correct;
use crate::model::Lenet;
use crate::training::{ArtifactPaths, TrainingConfig, WeightsRecorder};

/// Rebuild a trained model from the config and weights of an artifact directory.
pub fn load_model<B: Backend>(
    artifact_dir: &str,
    device: &B::Device,
) -> Result<(TrainingConfig, Lenet<B>)> {
    let paths = ArtifactPaths::new(artifact_dir);
    let config = TrainingConfig::load(paths.config())?;
    let model = config
        .model
        .init::<B>(device)?
        .load_file(paths.weights(), &WeightsRecorder::new(), device)?;

    log::info!("Loaded model from {}", paths.weights_file().display());
    Ok((config, model))
}

/// Misclassifications and timing over a scored split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreReport {
    pub errors: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl ScoreReport {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (1.0 - self.errors as f64 / self.total as f64) * 100.0
    }

    pub fn per_image(&self) -> Duration {
        match self.total {
            0 => Duration::ZERO,
            total => self.elapsed / total as u32,
        }
    }
}

impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TOTAL PROCESSING TIME: {:.6} s ({} us per image)",
            self.elapsed.as_secs_f64(),
            self.per_image().as_micros()
        )?;
        writeln!(f, "Errors : {} / {}", self.errors, self.total)?;
        write!(f, "Success rate = {:.2}%", self.success_rate())
    }
}

/// Classify every batch of `loader` from the softmax output and count mispredictions.
pub fn score<B: Backend>(
    model: &Lenet<B>,
    loader: &dyn DataLoader<MnistBatch<B>>,
) -> ScoreReport {
    let start = Instant::now();
    let mut errors = 0;
    let mut total = 0;

    for batch in loader.iter() {
        let [batch_size, _, _] = batch.images.dims();
        let probabilities = model.predict(batch.images);

        errors += batch_size - count_correct(probabilities, batch.targets);
        total += batch_size;
    }

    let report = ScoreReport {
        errors,
        total,
        elapsed: start.elapsed(),
    };
    log::info!("Scored {total} images with {errors} errors");
    report
}

/// Most likely digit of a single image with the full probability distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub digit: usize,
    pub probabilities: Vec<f32>,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let probabilities = self
            .probabilities
            .iter()
            .map(|p| format!("{:.2}%", p * 100.0))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(f, "Softmax output: {probabilities}")?;
        write!(f, "Predicted: {}", self.digit)
    }
}

pub fn predict_image<B: Backend>(
    model: &Lenet<B>,
    image: &[[f32; WIDTH]; HEIGHT],
    device: &B::Device,
) -> Result<Prediction> {
    let images = images_tensor::<B>(std::iter::once(image), device);
    let probabilities = model
        .predict(images)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| Error::Data(format!("{err:?}")))?;

    // First maximum wins on ties, as the argmax of the model output.
    let digit = probabilities
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(best, max), (i, p)| {
            if *p > max {
                (i, *p)
            } else {
                (best, max)
            }
        })
        .0;

    Ok(Prediction {
        digit,
        probabilities,
    })
}
