//! Slide thumbnails with the extraction overlaid.
//!
//! A thumbnail is a downscaled view of the slide with every accepted patch
//! outlined in its label's colour and, for annotated slides, the annotation
//! polygons traced on top. Thumbnails are written to
//! `<root>/thumbnails/<slide_name>.png`.

use std::fs;
use std::path::{Path, PathBuf};

use geo::Polygon;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::error::WriterError;
use crate::metadata::CoordsMetadata;

/// Longer side of a stored thumbnail in pixels.
pub const THUMBNAIL_MAX_SIDE: u32 = 1024;

/// Directory below the patch root that holds thumbnails.
pub const THUMBNAIL_DIR: &str = "thumbnails";

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([0, 170, 0]),
    Rgb([255, 160, 0]),
    Rgb([150, 0, 200]),
    Rgb([0, 180, 200]),
    Rgb([120, 80, 40]),
    Rgb([255, 0, 170]),
];

/// Outline colour of a label.
///
/// `Tumor` is always red; other labels map to a fixed palette entry.
pub fn label_colour(label: &str) -> Rgb<u8> {
    match label {
        "Tumor" => Rgb([230, 0, 0]),
        "Mix" => Rgb([0, 60, 230]),
        "Mosaic" => Rgb([240, 220, 0]),
        other => {
            let hash = other
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)));
            PALETTE[hash % PALETTE.len()]
        }
    }
}

/// A downscaled slide image in slide coordinates.
pub struct SlideThumbnail {
    image: RgbImage,
    scale_x: f32,
    scale_y: f32,
}

impl SlideThumbnail {
    /// Wrap `image`, a downscaled view of a slide of `slide_dimensions`.
    pub fn new(image: RgbImage, slide_dimensions: (u32, u32)) -> Self {
        let ratio = |thumb: u32, slide: u32| {
            if slide == 0 {
                1.0
            } else {
                thumb as f32 / slide as f32
            }
        };
        let scale_x = ratio(image.width(), slide_dimensions.0);
        let scale_y = ratio(image.height(), slide_dimensions.1);
        Self {
            image,
            scale_x,
            scale_y,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Outline every recorded patch in its label's colour.
    pub fn draw_patches(&mut self, coords: &CoordsMetadata) {
        let size = coords.patch_size() as f32;
        let width = ((size * self.scale_x).round() as u32).max(1);
        let height = ((size * self.scale_y).round() as u32).max(1);
        for (label, points) in coords.iter() {
            let colour = label_colour(label);
            for &(x, y) in points {
                let left = (x as f32 * self.scale_x).round() as i32;
                let top = (y as f32 * self.scale_y).round() as i32;
                let rect = Rect::at(left, top).of_size(width, height);
                draw_hollow_rect_mut(&mut self.image, rect, colour);
            }
        }
    }

    /// Trace the exterior ring of an annotation polygon.
    pub fn draw_outline(&mut self, label: &str, polygon: &Polygon<f64>) {
        let colour = label_colour(label);
        for line in polygon.exterior().lines() {
            let start = (
                line.start.x as f32 * self.scale_x,
                line.start.y as f32 * self.scale_y,
            );
            let end = (line.end.x as f32 * self.scale_x, line.end.y as f32 * self.scale_y);
            draw_line_segment_mut(&mut self.image, start, end, colour);
        }
    }

    /// Write the thumbnail as `<root>/thumbnails/<slide_name>.png`.
    pub fn save(&self, root: &Path, slide_name: &str) -> Result<PathBuf, WriterError> {
        let dir = root.join(THUMBNAIL_DIR);
        fs::create_dir_all(&dir).map_err(|source| WriterError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!("{slide_name}.png"));
        self.image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| WriterError::Encode {
                message: e.to_string(),
            })?;
        Ok(path)
    }
}
