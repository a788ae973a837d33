//! Reader and writer for the IDX files MNIST is distributed in.
//!
//! An IDX file starts with a 4-byte magic number whose last byte is the number of
//! dimensions, followed by one big-endian `u32` per dimension and the raw `u8` payload.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Magic number of an unsigned byte file with a single dimension (labels).
pub const LABELS_MAGIC: u32 = 0x0000_0801;
/// Magic number of an unsigned byte file with three dimensions (images).
pub const IMAGES_MAGIC: u32 = 0x0000_0803;

const LABELS_HEADER: usize = 8;
const IMAGES_HEADER: usize = 16;

/// A stack of grayscale images read from an IDX3 file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxImages {
    pub rows: usize,
    pub cols: usize,
    /// Row-major pixels, `count * rows * cols` bytes.
    pub pixels: Vec<u8>,
}

impl IdxImages {
    pub fn len(&self) -> usize {
        match self.image_size() {
            0 => 0,
            size => self.pixels.len() / size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image_size(&self) -> usize {
        self.rows * self.cols
    }

    /// Pixels of the image at `index`.
    pub fn image(&self, index: usize) -> Option<&[u8]> {
        let size = self.image_size();
        let start = index.checked_mul(size)?;
        self.pixels.get(start..start + size)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let chunk = bytes
        .get(offset..offset + 4)
        .ok_or(Error::IdxTruncated {
            expected: offset + 4,
            found: bytes.len(),
        })?;
    Ok(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

fn check_magic(bytes: &[u8], expected: u32) -> Result<()> {
    let found = read_u32(bytes, 0)?;
    if found != expected {
        return Err(Error::IdxMagic { expected, found });
    }
    Ok(())
}

fn payload(bytes: &[u8], header: usize, len: Option<usize>) -> Result<&[u8]> {
    // A length that overflows can never be satisfied by the buffer.
    let expected = len
        .and_then(|len| len.checked_add(header))
        .unwrap_or(usize::MAX);
    if bytes.len() < expected {
        return Err(Error::IdxTruncated {
            expected,
            found: bytes.len(),
        });
    }
    Ok(&bytes[header..expected])
}

/// Parse an in-memory IDX1 label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    check_magic(bytes, LABELS_MAGIC)?;
    let count = read_u32(bytes, 4)? as usize;

    Ok(payload(bytes, LABELS_HEADER, Some(count))?.to_vec())
}

/// Parse an in-memory IDX3 image file.
pub fn parse_images(bytes: &[u8]) -> Result<IdxImages> {
    check_magic(bytes, IMAGES_MAGIC)?;
    let count = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;

    if count > 0 && (rows == 0 || cols == 0) {
        return Err(Error::ImageSize {
            expected_rows: 1,
            expected_cols: 1,
            rows,
            cols,
        });
    }

    let len = count
        .checked_mul(rows)
        .and_then(|len| len.checked_mul(cols));
    let pixels = payload(bytes, IMAGES_HEADER, len)?.to_vec();

    Ok(IdxImages { rows, cols, pixels })
}

pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| Error::io(path, err))?;

    parse_labels(&bytes)
}

pub fn read_images<P: AsRef<Path>>(path: P) -> Result<IdxImages> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| Error::io(path, err))?;

    parse_images(&bytes)
}

/// Encode labels as an IDX1 file.
pub fn encode_labels(labels: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(LABELS_HEADER + labels.len());
    bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    bytes.extend_from_slice(labels);
    bytes
}

/// Encode images as an IDX3 file.
pub fn encode_images(images: &IdxImages) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(IMAGES_HEADER + images.pixels.len());
    bytes.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
    bytes.extend_from_slice(&(images.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&(images.rows as u32).to_be_bytes());
    bytes.extend_from_slice(&(images.cols as u32).to_be_bytes());
    bytes.extend_from_slice(&images.pixels);
    bytes
}

pub fn write_labels<P: AsRef<Path>>(path: P, labels: &[u8]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, encode_labels(labels)).map_err(|err| Error::io(path, err))
}

pub fn write_images<P: AsRef<Path>>(path: P, images: &IdxImages) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, encode_images(images)).map_err(|err| Error::io(path, err))
}
