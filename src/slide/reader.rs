//! SlideReader trait for format-agnostic region access.
//!
//! This module defines the `SlideReader` trait, which provides a unified
//! interface for pulling square pixel blocks out of a slide regardless of the
//! underlying file format, and the `SlideOpener` trait that turns a path into
//! a reader.
//!
//! # Usage
//!
//! The crate ships [`ImageSlide`], a reader over a fully decoded flat image.
//! It covers tissue microarray cores and any format the `image` crate decodes.
//! Pyramidal formats plug in by implementing [`SlideOpener`] and returning
//! their own reader.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};

use crate::error::SlideError;

// =============================================================================
// Slide Layout
// =============================================================================

/// How a slide file is interpreted when opened.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SlideLayout {
    /// Regular whole slide; coordinates are level-0 pixels.
    #[default]
    WholeSlide,

    /// Flat tissue microarray core, edge-padded on every side by `padding`
    /// pixels so that border tiles stay full-size.
    TmaCore { padding: u32 },
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Format-agnostic interface for reading regions from a slide.
///
/// Readers are owned by exactly one worker, so they only need to be `Send`.
pub trait SlideReader: Send {
    /// Get dimensions of the full-resolution image.
    ///
    /// Returns `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Read the `size`×`size` square whose top-left corner is `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the square does not fit inside the slide or if the
    /// underlying read fails.
    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError>;

    /// Get a unique identifier for this slide (for logging).
    fn identifier(&self) -> &str;

    /// Downscaled view of the whole slide, longer side at most `max_side`.
    ///
    /// The default walks the slide in square blocks through
    /// [`read_region`](Self::read_region). Readers holding the full image in
    /// memory should override it.
    fn thumbnail(&self, max_side: u32) -> Result<RgbImage, SlideError> {
        let (width, height) = self.dimensions();
        let (thumb_width, thumb_height) = thumbnail_size(width, height, max_side);
        let mut thumb = RgbImage::new(thumb_width, thumb_height);
        let block = THUMBNAIL_BLOCK.min(width).min(height);
        if block == 0 {
            return Ok(thumb);
        }

        let scale_x = f64::from(thumb_width) / f64::from(width);
        let scale_y = f64::from(thumb_height) / f64::from(height);
        // Blocks at the right and bottom edges are shifted inward to fit.
        for y in (0..height).step_by(block as usize) {
            let y0 = y.min(height - block);
            for x in (0..width).step_by(block as usize) {
                let x0 = x.min(width - block);
                let region = self.read_region(x0, y0, block)?;

                let left = (f64::from(x0) * scale_x) as u32;
                let top = (f64::from(y0) * scale_y) as u32;
                let right = (f64::from(x0 + block) * scale_x).ceil() as u32;
                let bottom = (f64::from(y0 + block) * scale_y).ceil() as u32;
                let scaled = imageops::resize(
                    &region,
                    right.saturating_sub(left).max(1),
                    bottom.saturating_sub(top).max(1),
                    FilterType::Triangle,
                );
                imageops::replace(&mut thumb, &scaled, i64::from(left), i64::from(top));
            }
        }
        Ok(thumb)
    }

    /// Check that a square fits inside the slide.
    fn check_bounds(&self, x: u32, y: u32, size: u32) -> Result<(), SlideError> {
        let (width, height) = self.dimensions();
        let fits = u64::from(x) + u64::from(size) <= u64::from(width)
            && u64::from(y) + u64::from(size) <= u64::from(height);
        if fits {
            Ok(())
        } else {
            Err(SlideError::RegionOutOfBounds {
                x,
                y,
                size,
                width,
                height,
            })
        }
    }
}

/// Level-0 square read per step when a reader builds a thumbnail region by region.
const THUMBNAIL_BLOCK: u32 = 2048;

/// Size of a thumbnail whose longer side is at most `max_side`.
///
/// Slides already smaller than `max_side` keep their size.
pub fn thumbnail_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (width, height);
    }
    let scale = f64::from(max_side) / f64::from(longest);
    let shrink = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (shrink(width), shrink(height))
}

/// Opens slides by path.
///
/// Shared read-only between workers; each call returns a reader owned by the
/// calling worker.
pub trait SlideOpener: Send + Sync {
    /// Open the slide at `path` using the given layout.
    fn open(&self, path: &Path, layout: SlideLayout) -> Result<Box<dyn SlideReader>, SlideError>;
}

// =============================================================================
// Flat Image Slide
// =============================================================================

/// A slide backed by a fully decoded RGB image.
#[derive(Debug, Clone)]
pub struct ImageSlide {
    image: RgbImage,
    identifier: String,
}

impl ImageSlide {
    /// Wrap an already decoded image.
    pub fn new(image: RgbImage, identifier: impl Into<String>) -> Self {
        Self {
            image,
            identifier: identifier.into(),
        }
    }

    /// Wrap an image after replicating its edge pixels `padding` times on
    /// every side.
    pub fn padded(image: RgbImage, padding: u32, identifier: impl Into<String>) -> Self {
        Self::new(edge_pad(&image, padding), identifier)
    }

    /// Get the backing image.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

impl SlideReader for ImageSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError> {
        self.check_bounds(x, y, size)?;
        Ok(image::imageops::crop_imm(&self.image, x, y, size, size).to_image())
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn thumbnail(&self, max_side: u32) -> Result<RgbImage, SlideError> {
        let (width, height) = self.image.dimensions();
        let (thumb_width, thumb_height) = thumbnail_size(width, height, max_side);
        Ok(imageops::thumbnail(&self.image, thumb_width, thumb_height))
    }
}

/// Replicate the outermost pixels of `image` outward by `padding` pixels.
pub fn edge_pad(image: &RgbImage, padding: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if padding == 0 || width == 0 || height == 0 {
        return image.clone();
    }

    RgbImage::from_fn(width + 2 * padding, height + 2 * padding, |px, py| {
        let sx = px.saturating_sub(padding).min(width - 1);
        let sy = py.saturating_sub(padding).min(height - 1);
        *image.get_pixel(sx, sy)
    })
}

// =============================================================================
// Image File Opener
// =============================================================================

/// Opens slides by decoding the whole file with the `image` crate.
///
/// The format is taken from the file's magic bytes rather than its extension,
/// so TIFF-container slides such as `.svs` and `.scn` decode as TIFF.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileOpener;

impl SlideOpener for ImageFileOpener {
    fn open(&self, path: &Path, layout: SlideLayout) -> Result<Box<dyn SlideReader>, SlideError> {
        let open_error = |message: String| SlideError::Open {
            path: path.to_path_buf(),
            message,
        };
        let decoded = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| open_error(e.to_string()))?
            .decode()
            .map_err(|e| open_error(e.to_string()))?;
        let identifier = path.display().to_string();
        let rgb = decoded.to_rgb8();

        let slide = match layout {
            SlideLayout::WholeSlide => ImageSlide::new(rgb, identifier),
            SlideLayout::TmaCore { padding } => ImageSlide::padded(rgb, padding, identifier),
        };
        Ok(Box::new(slide))
    }
}

// =============================================================================
// Tests
// =============================================================================
