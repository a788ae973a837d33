//! LeNet convolutional network trained on MNIST with burn.

pub mod architecture;
pub mod data;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod idx;
pub mod images;
pub mod inference;
pub mod model;
pub mod training;

pub use error::{Error, Result};
