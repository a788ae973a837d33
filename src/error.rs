use std::path::PathBuf;

use burn::config::ConfigError;
use burn::record::RecorderError;

/// Errors produced while loading data, training or reloading a LeNet model.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O failure while reading or writing a file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The IDX header does not carry the expected magic number.
    #[error("Invalid IDX magic number {found:#010x}, expected {expected:#010x}")]
    IdxMagic { expected: u32, found: u32 },

    /// The IDX payload is shorter than its header announces.
    #[error("Truncated IDX data: expected {expected} bytes, found {found}")]
    IdxTruncated { expected: usize, found: usize },

    /// Images and labels of a split do not line up.
    #[error("Found {images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    /// Image geometry differs from what the model consumes.
    #[error("Expected {expected_rows}x{expected_cols} images, found {rows}x{cols}")]
    ImageSize {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    /// A label is outside `0..num_classes`.
    #[error("Label {label} is out of range for {num_classes} classes")]
    LabelOutOfRange { label: u8, num_classes: usize },

    /// The layer stack collapses the feature map to nothing.
    #[error("Invalid model geometry: {0}")]
    Geometry(String),

    #[error("Config error: {0:?}")]
    Config(ConfigError),

    #[error("Record error: {0:?}")]
    Record(RecorderError),

    /// Tensor data could not be read back as the requested element type.
    #[error("Tensor data error: {0}")]
    Data(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<RecorderError> for Error {
    fn from(err: RecorderError) -> Self {
        Self::Record(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
