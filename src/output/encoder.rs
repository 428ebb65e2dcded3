//! Patch resizing and encoding.
//!
//! Accepted tiles are read at `patch_size` and written once per configured
//! resize size. Resizing uses a Lanczos3 filter; a tile already at the target
//! size is encoded as is.

use std::borrow::Cow;
use std::io::{Cursor, Write};

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, RgbImage};

use crate::error::WriterError;

/// Resize `patch` to a `size`×`size` square.
pub fn resize_patch(patch: &RgbImage, size: u32) -> Cow<'_, RgbImage> {
    if patch.dimensions() == (size, size) {
        Cow::Borrowed(patch)
    } else {
        Cow::Owned(imageops::resize(patch, size, size, FilterType::Lanczos3))
    }
}

/// Encode a patch as PNG.
///
/// # Errors
///
/// Returns an error if the PNG encoder rejects the image.
pub fn encode_png(patch: &RgbImage) -> Result<Bytes, WriterError> {
    let mut output = Vec::new();
    PngEncoder::new(Cursor::new(&mut output))
        .write_image(
            patch.as_raw(),
            patch.width(),
            patch.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| WriterError::Encode {
            message: e.to_string(),
        })?;
    Ok(Bytes::from(output))
}

/// Gzip `data` at maximum compression.
pub fn gzip(data: &[u8]) -> Result<Bytes, WriterError> {
    let encode_err = |e: std::io::Error| WriterError::Encode {
        message: e.to_string(),
    };
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder.write_all(data).map_err(encode_err)?;
    Ok(Bytes::from(encoder.finish().map_err(encode_err)?))
}
