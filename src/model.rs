use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::data::MnistBatch;
use crate::dataset::{HEIGHT, WIDTH};
use crate::error::Error;

/// Hyper-parameters of the LeNet layer stack.
#[derive(Config, Debug)]
pub struct LenetConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 28)]
    pub image_size: usize,
    #[config(default = 1)]
    pub channels: usize,
    #[config(default = 20)]
    pub conv1_filters: usize,
    #[config(default = 40)]
    pub conv2_filters: usize,
    #[config(default = 5)]
    pub kernel_size: usize,
    #[config(default = 2)]
    pub pool_size: usize,
    #[config(default = 400)]
    pub hidden_size: usize,
}

/// Spatial side length of the feature maps after each layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LenetGeometry {
    pub conv1: usize,
    pub pool1: usize,
    pub conv2: usize,
    pub pool2: usize,
    /// Features fed to the first dense layer.
    pub flattened: usize,
}

#[derive(Module, Debug)]
pub struct Lenet<B: Backend> {
    conv1: Conv2d<B>,
    pool1: MaxPool2d,
    conv2: Conv2d<B>,
    pool2: MaxPool2d,
    dense: Linear<B>,
    output: Linear<B>,
    activation: Relu,
}

impl LenetConfig {
    /// Output sizes of the valid convolutions and non-overlapping poolings.
    pub fn geometry(&self) -> crate::Result<LenetGeometry> {
        // Batches carry single-channel MNIST images only.
        if self.channels != 1 {
            return Err(Error::Geometry(format!(
                "expected 1 input channel, got {}",
                self.channels
            )));
        }
        if self.image_size != HEIGHT || self.image_size != WIDTH {
            return Err(Error::Geometry(format!(
                "expected {HEIGHT}x{WIDTH} input images, got {s}x{s}",
                s = self.image_size
            )));
        }
        if self.pool_size == 0 || self.kernel_size == 0 {
            return Err(Error::Geometry(
                "kernel and pool sizes must be positive".to_string(),
            ));
        }

        let conv = |size: usize, layer: &str| {
            size.checked_sub(self.kernel_size - 1)
                .filter(|out| *out > 0)
                .ok_or_else(|| {
                    Error::Geometry(format!(
                        "{layer}: kernel {k}x{k} does not fit a {size}x{size} input",
                        k = self.kernel_size
                    ))
                })
        };
        let pool = |size: usize, layer: &str| match size / self.pool_size {
            0 => Err(Error::Geometry(format!(
                "{layer}: pool {p}x{p} does not fit a {size}x{size} input",
                p = self.pool_size
            ))),
            out => Ok(out),
        };

        let conv1 = conv(self.image_size, "conv2d")?;
        let pool1 = pool(conv1, "max_pooling2d")?;
        let conv2 = conv(pool1, "conv2d_1")?;
        let pool2 = pool(conv2, "max_pooling2d_1")?;

        Ok(LenetGeometry {
            conv1,
            pool1,
            conv2,
            pool2,
            flattened: self.conv2_filters * pool2 * pool2,
        })
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<Lenet<B>> {
        let geometry = self.geometry()?;
        let kernel = [self.kernel_size, self.kernel_size];
        let pool = [self.pool_size, self.pool_size];

        Ok(Lenet {
            conv1: Conv2dConfig::new([self.channels, self.conv1_filters], kernel).init(device),
            pool1: MaxPool2dConfig::new(pool).with_strides(pool).init(),
            conv2: Conv2dConfig::new([self.conv1_filters, self.conv2_filters], kernel)
                .init(device),
            pool2: MaxPool2dConfig::new(pool).with_strides(pool).init(),
            dense: LinearConfig::new(geometry.flattened, self.hidden_size).init(device),
            output: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }
}

impl<B: Backend> Lenet<B> {
    /// # Shapes
    ///   - Images [batch_size, height, width]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, height, width] = images.dims();

        // Create a channel at the second dimension.
        let x = images.reshape([batch_size, 1, height, width]);

        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = x.flatten::<2>(1, 3);
        let x = self.dense.forward(x);
        let x = self.activation.forward(x);

        self.output.forward(x)
    }

    /// Class probabilities, the softmax of [forward](Lenet::forward).
    pub fn predict(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        activation::softmax(self.forward(images), 1)
    }

    pub fn forward_classification(&self, batch: MnistBatch<B>) -> ClassificationOutput<B> {
        let output = self.forward(batch.images);
        let loss = categorical_cross_entropy(output.clone(), batch.one_hot);

        ClassificationOutput::new(loss, output, batch.targets)
    }
}

/// Mean categorical cross-entropy between the softmax of `logits` and one-hot `targets`.
///
/// The softmax is folded into a log-softmax so large logits do not overflow.
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = activation::log_softmax(logits, 1);

    (log_probs * targets).sum_dim(1).mean().neg()
}

impl<B: AutodiffBackend> TrainStep<MnistBatch<B>, ClassificationOutput<B>> for Lenet<B> {
    fn step(&self, batch: MnistBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<MnistBatch<B>, ClassificationOutput<B>> for Lenet<B> {
    fn step(&self, batch: MnistBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch)
    }
}
