use std::path::Path;

use lenet_mnist::dataset::{MnistSplit, HEIGHT, WIDTH};
use lenet_mnist::idx::{self, IdxImages};

/// A digit-like pattern: a bright vertical bar whose position depends on the label.
pub fn pattern(label: u8, variant: usize) -> Vec<u8> {
    let column = 3 + label as usize * 2;
    let mut pixels = vec![0u8; WIDTH * HEIGHT];
    for row in 4..24 {
        for col in column..column + 3 {
            pixels[row * WIDTH + col] = 255 - (variant % 5) as u8 * 10;
        }
    }
    pixels
}

pub fn synthetic_split(labels: &[u8]) -> IdxImages {
    let pixels = labels
        .iter()
        .enumerate()
        .flat_map(|(i, label)| pattern(*label, i))
        .collect();

    IdxImages {
        rows: HEIGHT,
        cols: WIDTH,
        pixels,
    }
}

/// Write both splits as IDX files, the way MNIST is laid out once uncompressed.
pub fn write_mnist_dir(dir: &Path, train_labels: &[u8], test_labels: &[u8]) {
    for (split, labels) in [(MnistSplit::Train, train_labels), (MnistSplit::Test, test_labels)] {
        idx::write_images(dir.join(split.images_file()), &synthetic_split(labels)).unwrap();
        idx::write_labels(dir.join(split.labels_file()), labels).unwrap();
    }
}
