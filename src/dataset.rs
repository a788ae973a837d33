use std::fmt;
use std::path::{Path, PathBuf};

use burn::data::dataset::vision::{MnistDataset, MnistItem};
use burn::data::dataset::Dataset;

use crate::error::{Error, Result};
use crate::idx::{self, IdxImages};

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;

/// One of the two MNIST splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnistSplit {
    Train,
    Test,
}

impl MnistSplit {
    pub fn images_file(&self) -> &'static str {
        match self {
            Self::Train => "train-images-idx3-ubyte",
            Self::Test => "t10k-images-idx3-ubyte",
        }
    }

    pub fn labels_file(&self) -> &'static str {
        match self {
            Self::Train => "train-labels-idx1-ubyte",
            Self::Test => "t10k-labels-idx1-ubyte",
        }
    }
}

impl fmt::Display for MnistSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => f.write_str("train"),
            Self::Test => f.write_str("test"),
        }
    }
}

/// Where the MNIST files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MnistSource {
    /// Download through the burn dataset cache.
    Download,
    /// Read the uncompressed IDX files from a directory.
    Directory(PathBuf),
}

impl MnistSource {
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => Self::Directory(dir),
            None => Self::Download,
        }
    }

    pub fn load(&self, split: MnistSplit) -> Result<MnistData> {
        let data = match self {
            Self::Download => {
                log::info!("Loading MNIST {split} split from the dataset cache");
                match split {
                    MnistSplit::Train => MnistData::Downloaded(MnistDataset::train()),
                    MnistSplit::Test => MnistData::Downloaded(MnistDataset::test()),
                }
            }
            Self::Directory(dir) => {
                log::info!("Loading MNIST {split} split from {}", dir.display());
                MnistData::Local(IdxDataset::from_dir(dir, split)?)
            }
        };
        log::info!("MNIST {split} split has {} items", data.len());

        Ok(data)
    }
}

/// An MNIST split held in memory as raw bytes.
#[derive(Debug, Clone)]
pub struct IdxDataset {
    images: IdxImages,
    labels: Vec<u8>,
}

impl IdxDataset {
    /// Pair images with labels, refusing mismatched counts or non 28x28 images.
    pub fn new(images: IdxImages, labels: Vec<u8>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(Error::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        if !images.is_empty() && (images.rows != HEIGHT || images.cols != WIDTH) {
            return Err(Error::ImageSize {
                expected_rows: HEIGHT,
                expected_cols: WIDTH,
                rows: images.rows,
                cols: images.cols,
            });
        }

        Ok(Self { images, labels })
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P, split: MnistSplit) -> Result<Self> {
        let dir = dir.as_ref();
        let images = idx::read_images(dir.join(split.images_file()))?;
        let labels = idx::read_labels(dir.join(split.labels_file()))?;

        Self::new(images, labels)
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

impl Dataset<MnistItem> for IdxDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        let pixels = self.images.image(index)?;
        let label = *self.labels.get(index)?;

        Some(MnistItem {
            image: to_image(pixels),
            label,
        })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Lay out `WIDTH * HEIGHT` row-major pixels as a 2D array of raw `0..=255` values.
pub fn to_image(pixels: &[u8]) -> [[f32; WIDTH]; HEIGHT] {
    let mut image = [[0f32; WIDTH]; HEIGHT];
    for (i, pixel) in pixels.iter().take(WIDTH * HEIGHT).enumerate() {
        image[i / WIDTH][i % WIDTH] = *pixel as f32;
    }
    image
}

/// An MNIST split, whichever source it was loaded from.
pub enum MnistData {
    Downloaded(MnistDataset),
    Local(IdxDataset),
}

impl MnistData {
    pub fn labels(&self) -> Vec<u8> {
        match self {
            Self::Downloaded(dataset) => dataset.iter().map(|item| item.label).collect(),
            Self::Local(dataset) => dataset.labels().to_vec(),
        }
    }
}

impl Dataset<MnistItem> for MnistData {
    fn get(&self, index: usize) -> Option<MnistItem> {
        match self {
            Self::Downloaded(dataset) => dataset.get(index),
            Self::Local(dataset) => dataset.get(index),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Downloaded(dataset) => dataset.len(),
            Self::Local(dataset) => dataset.len(),
        }
    }
}
