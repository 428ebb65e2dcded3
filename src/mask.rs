//! Tissue masks.
//!
//! A mask restricts extraction to tissue. It is either a reduced-resolution
//! raster image (any non-zero pixel is tissue) or a polygon file in the
//! annotation format where every region is tissue. Both use the four-corner
//! rule from [`crate::tiling::corners`] with the mask overlap threshold.

use std::path::Path;

use image::GrayImage;

use crate::annotation::{load_annotations, AnnotationIndex, AnnotationRegion};
use crate::error::MaskError;
use crate::tiling::corners::{corner_samples, meets_overlap};

/// Default mask overlap: at least two of four corners on tissue.
pub const DEFAULT_MASK_OVERLAP: f64 = 0.4;

/// Raster mask file extensions.
const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Tissue query for tile origins of a single slide.
pub enum TissueMask {
    Raster(RasterMask),
    Regions(RegionMask),
}

impl TissueMask {
    /// Load a mask file for a slide of `slide_size` pixels.
    ///
    /// `.txt` files are polygon masks; image files are raster masks scaled to
    /// the slide.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be decoded or its extension is not
    /// recognised.
    pub fn load(
        path: &Path,
        overlap: f64,
        patch_size: u32,
        slide_size: (u32, u32),
    ) -> Result<Self, MaskError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if extension == "txt" {
            let regions = load_annotations(path)?;
            return Ok(Self::from_regions(regions, overlap, patch_size));
        }
        if !RASTER_EXTENSIONS.contains(&extension.as_str()) {
            return Err(MaskError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }

        let raster = image::open(path)
            .map_err(|e| MaskError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .to_luma8();
        if raster.width() == 0 || raster.height() == 0 {
            return Err(MaskError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(Self::from_raster(raster, overlap, patch_size, slide_size))
    }

    /// Build a raster mask scaled from the raster's size to `slide_size`.
    pub fn from_raster(
        raster: GrayImage,
        overlap: f64,
        patch_size: u32,
        slide_size: (u32, u32),
    ) -> Self {
        Self::Raster(RasterMask::new(raster, overlap, patch_size, slide_size))
    }

    /// Build a polygon mask where every region counts as tissue.
    pub fn from_regions(regions: Vec<AnnotationRegion>, overlap: f64, patch_size: u32) -> Self {
        Self::Regions(RegionMask {
            index: AnnotationIndex::new(regions, overlap),
            patch_size,
        })
    }

    /// Whether the tile at `(x, y)` lies on tissue.
    pub fn contains_tissue(&self, x: u32, y: u32) -> bool {
        match self {
            Self::Raster(mask) => mask.contains_tissue(x, y),
            Self::Regions(mask) => mask.index.contains(x, y, mask.patch_size),
        }
    }
}

/// Applies an optional mask; no mask admits every tile.
pub fn passes(mask: Option<&TissueMask>, x: u32, y: u32) -> bool {
    mask.map_or(true, |mask| mask.contains_tissue(x, y))
}

// =============================================================================
// Raster Mask
// =============================================================================

/// Reduced-resolution binary tissue image.
pub struct RasterMask {
    raster: GrayImage,
    scale_x: f64,
    scale_y: f64,
    overlap: f64,
    patch_size: u32,
}

impl RasterMask {
    fn new(raster: GrayImage, overlap: f64, patch_size: u32, slide_size: (u32, u32)) -> Self {
        let scale = |slide: u32, mask: u32| f64::from(slide) / f64::from(mask.max(1));
        Self {
            scale_x: scale(slide_size.0, raster.width()),
            scale_y: scale(slide_size.1, raster.height()),
            raster,
            overlap,
            patch_size,
        }
    }

    /// Slide pixels per mask pixel along each axis.
    pub fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }

    fn is_tissue_at(&self, sx: f64, sy: f64) -> bool {
        let mx = (sx / self.scale_x).floor();
        let my = (sy / self.scale_y).floor();
        if mx < 0.0 || my < 0.0 {
            return false;
        }
        let (mx, my) = (mx as u32, my as u32);
        mx < self.raster.width() && my < self.raster.height() && self.raster.get_pixel(mx, my).0[0] > 0
    }

    fn contains_tissue(&self, x: u32, y: u32) -> bool {
        let hits = corner_samples(x, y, self.patch_size)
            .iter()
            .filter(|&&(sx, sy)| self.is_tissue_at(sx, sy))
            .count();
        meets_overlap(hits, self.overlap)
    }
}

/// Polygon tissue regions.
pub struct RegionMask {
    index: AnnotationIndex,
    patch_size: u32,
}
