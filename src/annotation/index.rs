use std::collections::BTreeMap;

use geo::{Area, BoundingRect, Contains, LineString, Point, Polygon, Rect, Translate};

use crate::tiling::corners::{corner_samples, meets_overlap};

/// Label of the binary tumor class.
pub const TUMOR_LABEL: &str = "Tumor";

/// Default overlap threshold: all four corners inside the polygon.
pub const DEFAULT_ANNOTATION_OVERLAP: f64 = 1.0;

// =============================================================================
// Annotation Region
// =============================================================================

/// A labelled polygon drawn on a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRegion {
    label: String,
    polygon: Polygon<f64>,
}

impl AnnotationRegion {
    /// Create a region from its outline. The ring is closed automatically.
    pub fn new(label: impl Into<String>, vertices: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.into(),
            polygon: Polygon::new(LineString::from(vertices), vec![]),
        }
    }

    /// Axis-aligned rectangle `[x0, x1) × [y0, y1)`.
    pub fn rectangle(label: impl Into<String>, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(label, vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Number of distinct vertices (the closing vertex is not counted).
    pub fn vertex_count(&self) -> usize {
        self.polygon.exterior().0.len().saturating_sub(1)
    }

    /// Shift the region by `(dx, dy)` pixels.
    pub fn translated(mut self, dx: f64, dy: f64) -> Self {
        self.polygon = self.polygon.translate(dx, dy);
        self
    }
}

// =============================================================================
// Annotation Index
// =============================================================================

struct IndexedRegion {
    label: String,
    polygon: Polygon<f64>,
    bounds: Option<Rect<f64>>,
}

/// Per-slide lookup from tile squares to annotation labels.
///
/// See [`crate::tiling::corners`] for the containment rule.
///
/// # Example
///
/// ```
/// use wsi_patcher::annotation::{AnnotationIndex, AnnotationRegion};
///
/// let regions = vec![AnnotationRegion::rectangle("Tumor", 0.0, 0.0, 2048.0, 2048.0)];
/// let index = AnnotationIndex::new(regions, 1.0);
///
/// assert_eq!(index.labels_for(1024, 1024, 1024), vec!["Tumor"]);
/// assert!(index.labels_for(2048, 0, 1024).is_empty());
/// ```
pub struct AnnotationIndex {
    regions: Vec<IndexedRegion>,
    overlap_threshold: f64,
    tumor_only: bool,
}

impl AnnotationIndex {
    /// Build the index with the given overlap threshold in `(0, 1]`.
    pub fn new(regions: Vec<AnnotationRegion>, overlap_threshold: f64) -> Self {
        let regions = regions
            .into_iter()
            .map(|region| IndexedRegion {
                bounds: region.polygon.bounding_rect(),
                label: region.label,
                polygon: region.polygon,
            })
            .collect();

        Self {
            regions,
            overlap_threshold,
            tumor_only: false,
        }
    }

    /// Restrict answers to [`TUMOR_LABEL`].
    pub fn tumor_only(mut self, tumor_only: bool) -> Self {
        self.tumor_only = tumor_only;
        self
    }

    pub fn overlap_threshold(&self) -> f64 {
        self.overlap_threshold
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Every region's label and outline, regardless of tumor-only mode.
    pub fn outlines(&self) -> impl Iterator<Item = (&str, &Polygon<f64>)> {
        self.regions
            .iter()
            .map(|region| (region.label.as_str(), &region.polygon))
    }

    /// Distinct labels in first-seen order, honouring tumor-only mode.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for region in &self.regions {
            if self.admits(&region.label) && !labels.contains(&region.label.as_str()) {
                labels.push(&region.label);
            }
        }
        labels
    }

    /// Labels of every region the square at `(x, y)` qualifies for.
    ///
    /// Labels are returned once each, in region order. An empty result means
    /// the tile is unlabelled and should be rejected.
    pub fn labels_for(&self, x: u32, y: u32, patch_size: u32) -> Vec<&str> {
        let samples = corner_samples(x, y, patch_size);
        let mut labels: Vec<&str> = Vec::new();

        for region in &self.regions {
            if !self.admits(&region.label) || labels.contains(&region.label.as_str()) {
                continue;
            }
            if let Some(bounds) = region.bounds {
                if !overlaps_bounds(&bounds, &samples) {
                    continue;
                }
            }
            let hits = samples
                .iter()
                .filter(|&&(sx, sy)| region.polygon.contains(&Point::new(sx, sy)))
                .count();
            if meets_overlap(hits, self.overlap_threshold) {
                labels.push(&region.label);
            }
        }
        labels
    }

    /// Whether any region qualifies for the square at `(x, y)`.
    pub fn contains(&self, x: u32, y: u32, patch_size: u32) -> bool {
        !self.labels_for(x, y, patch_size).is_empty()
    }

    /// Total polygon area per label, in square pixels.
    pub fn area_by_label(&self) -> BTreeMap<String, f64> {
        let mut areas = BTreeMap::new();
        for region in &self.regions {
            *areas.entry(region.label.clone()).or_insert(0.0) += region.polygon.unsigned_area();
        }
        areas
    }

    fn admits(&self, label: &str) -> bool {
        !self.tumor_only || label == TUMOR_LABEL
    }
}

/// Whether any sample lies within the polygon's bounding box.
fn overlaps_bounds(bounds: &Rect<f64>, samples: &[(f64, f64)]) -> bool {
    let (min, max) = (bounds.min(), bounds.max());
    samples
        .iter()
        .any(|&(x, y)| x >= min.x && x <= max.x && y >= min.y && y <= max.y)
}

// =============================================================================
// Tests
// =============================================================================
