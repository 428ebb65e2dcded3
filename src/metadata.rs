//! Extracted coordinate records.
//!
//! [`CoordsMetadata`] accumulates the accepted tile origins of one slide;
//! [`SlideCoordsMetadata`] merges them across slides and is persisted as JSON:
//!
//! ```json
//! {
//!   "patch_size": 1024,
//!   "resize_sizes": [1024, 512],
//!   "coords": {
//!     "VOA-1099A": { "Tumor": [[0, 0], [1024, 0]], "Stroma": [[4096, 2048]] }
//!   }
//! }
//! ```
//!
//! Coordinates keep their extraction order; slides and labels are written in
//! name order.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

// =============================================================================
// Per-slide Coordinates
// =============================================================================

/// Accepted tile origins of one slide, grouped by label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordsMetadata {
    slide_name: String,
    patch_size: u32,
    coords: BTreeMap<String, Vec<(u32, u32)>>,
    seen: HashSet<(String, u32, u32)>,
}

impl CoordsMetadata {
    pub fn new(slide_name: impl Into<String>, patch_size: u32) -> Self {
        Self {
            slide_name: slide_name.into(),
            patch_size,
            coords: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn slide_name(&self) -> &str {
        &self.slide_name
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Record `(x, y)` under `label`.
    ///
    /// Returns `false` and leaves the record unchanged if the coordinate is
    /// already present for that label.
    pub fn add_coord(&mut self, label: &str, x: u32, y: u32) -> bool {
        if !self.seen.insert((label.to_string(), x, y)) {
            return false;
        }
        self.coords.entry(label.to_string()).or_default().push((x, y));
        true
    }

    pub fn contains(&self, label: &str, x: u32, y: u32) -> bool {
        self.seen.contains(&(label.to_string(), x, y))
    }

    /// Coordinates recorded under `label`, in insertion order.
    pub fn coords(&self, label: &str) -> &[(u32, u32)] {
        self.coords.get(label).map_or(&[], Vec::as_slice)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.coords.keys().map(String::as_str)
    }

    /// `(label, coordinates)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[(u32, u32)])> {
        self.coords.iter().map(|(l, c)| (l.as_str(), c.as_slice()))
    }

    /// Total number of recorded coordinates across labels.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// =============================================================================
// Merged Coordinates
// =============================================================================

/// Coordinates of every extracted slide plus the extraction parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlideCoordsMetadata {
    patch_size: u32,
    resize_sizes: Vec<u32>,
    slides: BTreeMap<String, CoordsMetadata>,
}

#[derive(Serialize)]
struct SlideCoordsFileRef<'a> {
    patch_size: u32,
    resize_sizes: &'a [u32],
    coords: BTreeMap<&'a str, &'a BTreeMap<String, Vec<(u32, u32)>>>,
}

#[derive(Deserialize)]
struct SlideCoordsFile {
    patch_size: u32,
    #[serde(default)]
    resize_sizes: Vec<u32>,
    #[serde(default)]
    coords: BTreeMap<String, BTreeMap<String, Vec<(f64, f64)>>>,
}

impl SlideCoordsMetadata {
    pub fn new(patch_size: u32, resize_sizes: Vec<u32>) -> Self {
        Self {
            patch_size,
            resize_sizes,
            slides: BTreeMap::new(),
        }
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn resize_sizes(&self) -> &[u32] {
        &self.resize_sizes
    }

    /// Add one slide's record, replacing any previous record for that slide.
    pub fn merge(&mut self, coords: CoordsMetadata) {
        self.slides.insert(coords.slide_name.clone(), coords);
    }

    pub fn get_slide(&self, slide_name: &str) -> Option<&CoordsMetadata> {
        self.slides.get(slide_name)
    }

    pub fn slides(&self) -> impl Iterator<Item = &CoordsMetadata> {
        self.slides.values()
    }

    pub fn slide_names(&self) -> impl Iterator<Item = &str> {
        self.slides.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Serialise to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let file = SlideCoordsFileRef {
            patch_size: self.patch_size,
            resize_sizes: &self.resize_sizes,
            coords: self
                .slides
                .iter()
                .map(|(name, slide)| (name.as_str(), &slide.coords))
                .collect(),
        };
        serde_json::to_string_pretty(&file)
    }

    /// Parse JSON produced by [`Self::to_json`].
    ///
    /// Coordinates may be stored as floats; they are rounded to the nearest
    /// pixel. Negative or non-finite coordinates are rejected and duplicate
    /// coordinates within a label are dropped.
    pub fn from_json(text: &str, origin: &Path) -> Result<Self, MetadataError> {
        let file: SlideCoordsFile =
            serde_json::from_str(text).map_err(|source| MetadataError::Json {
                path: origin.to_path_buf(),
                source,
            })?;

        let mut metadata = Self::new(file.patch_size, file.resize_sizes);
        for (slide, labels) in file.coords {
            let mut coords = CoordsMetadata::new(slide.clone(), file.patch_size);
            for (label, points) in labels {
                for (x, y) in points {
                    let (Some(px), Some(py)) = (to_pixel(x), to_pixel(y)) else {
                        return Err(MetadataError::InvalidCoordinate {
                            slide,
                            label,
                            x,
                            y,
                        });
                    };
                    coords.add_coord(&label, px, py);
                }
            }
            metadata.merge(coords);
        }
        Ok(metadata)
    }

    /// Write the JSON document to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), MetadataError> {
        let io_err = |source: std::io::Error| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = self.to_json().map_err(|source| MetadataError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, json).map_err(io_err)
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let text = fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }
}

fn to_pixel(value: f64) -> Option<u32> {
    let rounded = value.round();
    (rounded.is_finite() && rounded >= 0.0 && rounded <= f64::from(u32::MAX))
        .then_some(rounded as u32)
}
