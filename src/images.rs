//! MNIST digits as PGM graymaps, one file per image.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use burn::data::dataset::{vision::MnistItem, Dataset};
use image::{
    codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding},
    ExtendedColorType, ImageEncoder,
};

use crate::dataset::{MnistSplit, HEIGHT, WIDTH};
use crate::error::{Error, Result};
use crate::idx;

/// File name of the `index`-th image of a split, e.g. `t10k-images-idx3-ubyte[00042].pgm`.
pub fn pgm_name(split: MnistSplit, index: usize) -> String {
    format!("{}[{index:05}].pgm", split.images_file())
}

fn to_pixels(image: &[[f32; WIDTH]; HEIGHT]) -> Vec<u8> {
    image
        .iter()
        .flatten()
        .map(|pixel| pixel.round().clamp(0.0, 255.0) as u8)
        .collect()
}

/// Write a single raw `0..=255` image as a binary PGM file.
pub fn save_pgm<P: AsRef<Path>>(image: &[[f32; WIDTH]; HEIGHT], path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| Error::io(path, err))?;
    let encoder = PnmEncoder::new(BufWriter::new(file))
        .with_subtype(PnmSubtype::Graymap(SampleEncoding::Binary));

    encoder.write_image(
        &to_pixels(image),
        WIDTH as u32,
        HEIGHT as u32,
        ExtendedColorType::L8,
    )?;
    Ok(())
}

/// Read a 28x28 grayscale image with raw `0..=255` values.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<[[f32; WIDTH]; HEIGHT]> {
    let gray = image::open(path.as_ref())?.to_luma8();
    let (cols, rows) = gray.dimensions();

    if rows as usize != HEIGHT || cols as usize != WIDTH {
        return Err(Error::ImageSize {
            expected_rows: HEIGHT,
            expected_cols: WIDTH,
            rows: rows as usize,
            cols: cols as usize,
        });
    }

    let mut image = [[0f32; WIDTH]; HEIGHT];
    for (x, y, pixel) in gray.enumerate_pixels() {
        image[y as usize][x as usize] = pixel.0[0] as f32;
    }
    Ok(image)
}

/// Write the first `count` images of `dataset` as PGM files in `dir`, alongside an IDX
/// label file listing their labels in order.
pub fn export_pgm<D: Dataset<MnistItem>>(
    dataset: &D,
    split: MnistSplit,
    dir: &Path,
    count: usize,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;

    let mut labels = Vec::with_capacity(count.min(dataset.len()));
    let mut written = Vec::with_capacity(labels.capacity());

    for (index, item) in dataset.iter().take(count).enumerate() {
        let path = dir.join(pgm_name(split, index));
        save_pgm(&item.image, &path)?;
        labels.push(item.label);
        written.push(path);
    }
    idx::write_labels(dir.join(split.labels_file()), &labels)?;

    log::info!("Exported {} images to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::IdxDataset;
    use crate::idx::IdxImages;

    fn digit() -> [[f32; WIDTH]; HEIGHT] {
        let mut image = [[0f32; WIDTH]; HEIGHT];
        for (y, row) in image.iter_mut().enumerate() {
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = ((x * 9 + y * 3) % 256) as f32;
            }
        }
        image
    }

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(
            pgm_name(MnistSplit::Test, 42),
            "t10k-images-idx3-ubyte[00042].pgm"
        );
        assert_eq!(
            pgm_name(MnistSplit::Train, 12345),
            "train-images-idx3-ubyte[12345].pgm"
        );
    }

    #[test]
    fn saved_pgm_loads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digit.pgm");

        save_pgm(&digit(), &path).unwrap();

        assert_eq!(load_image(&path).unwrap(), digit());
        let header = fs::read(&path).unwrap();
        assert_eq!(&header[..2], b"P5");
    }

    #[test]
    fn rejects_images_of_another_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.pgm");
        image::GrayImage::new(14, 14).save(&path).unwrap();

        assert!(matches!(
            load_image(&path),
            Err(Error::ImageSize { rows: 14, .. })
        ));
    }

    #[test]
    fn exports_images_with_their_labels() {
        let dir = tempfile::tempdir().unwrap();
        let images = IdxImages {
            rows: HEIGHT,
            cols: WIDTH,
            pixels: vec![7; 3 * WIDTH * HEIGHT],
        };
        let dataset = IdxDataset::new(images, vec![4, 1, 8]).unwrap();

        let written = export_pgm(&dataset, MnistSplit::Test, dir.path(), 2).unwrap();

        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("t10k-images-idx3-ubyte[00001].pgm"));
        assert_eq!(load_image(&written[0]).unwrap(), [[7.0; WIDTH]; HEIGHT]);
        let labels = idx::read_labels(dir.path().join("t10k-labels-idx1-ubyte")).unwrap();
        assert_eq!(labels, vec![4, 1]);
    }
}
