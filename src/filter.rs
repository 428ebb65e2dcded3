//! Background rejection for candidate tiles.
//!
//! A pixel is blank when its luma `0.299 R + 0.587 G + 0.114 B` exceeds the
//! blank luminance. A block is foreground when the fraction of blank pixels
//! stays below the blank percentage.

use image::RgbImage;

/// Luma above which a pixel counts as blank.
pub const DEFAULT_BLANK_LUMINANCE: f32 = 0.8 * 255.0;

/// Blank fraction used when only fully contained tiles are admitted.
pub const DEFAULT_BLANK_PERCENT: f32 = 0.9;

/// Blank fraction used when boundary tiles are admitted.
pub const BOUNDARY_BLANK_PERCENT: f32 = 0.75;

/// Classifies pixel blocks as tissue or blank background.
///
/// # Example
///
/// ```
/// use image::{Rgb, RgbImage};
/// use wsi_patcher::filter::BackgroundFilter;
///
/// let filter = BackgroundFilter::new(0.9);
/// let white = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
/// let tissue = RgbImage::from_pixel(64, 64, Rgb([180, 90, 160]));
///
/// assert!(!filter.is_foreground(&white));
/// assert!(filter.is_foreground(&tissue));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundFilter {
    blank_percent: f32,
    blank_luminance: f32,
}

impl BackgroundFilter {
    pub fn new(blank_percent: f32) -> Self {
        Self {
            blank_percent,
            blank_luminance: DEFAULT_BLANK_LUMINANCE,
        }
    }

    /// Default filter for the annotation strategy given its overlap threshold.
    pub fn for_annotation_overlap(annotation_overlap: f64) -> Self {
        if annotation_overlap < 1.0 {
            Self::new(BOUNDARY_BLANK_PERCENT)
        } else {
            Self::new(DEFAULT_BLANK_PERCENT)
        }
    }

    pub fn with_blank_luminance(mut self, blank_luminance: f32) -> Self {
        self.blank_luminance = blank_luminance;
        self
    }

    pub fn blank_percent(&self) -> f32 {
        self.blank_percent
    }

    pub fn blank_luminance(&self) -> f32 {
        self.blank_luminance
    }

    /// Fraction of pixels in `block` brighter than the blank luminance.
    ///
    /// An empty block is entirely blank.
    pub fn blank_fraction(&self, block: &RgbImage) -> f32 {
        let total = block.width() as usize * block.height() as usize;
        if total == 0 {
            return 1.0;
        }
        let blank = block
            .pixels()
            .filter(|pixel| luma(pixel.0) > self.blank_luminance)
            .count();
        blank as f32 / total as f32
    }

    /// Whether `block` holds enough tissue to keep.
    pub fn is_foreground(&self, block: &RgbImage) -> bool {
        self.blank_fraction(block) < self.blank_percent
    }
}

impl Default for BackgroundFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BLANK_PERCENT)
    }
}

fn luma([r, g, b]: [u8; 3]) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}
