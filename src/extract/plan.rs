use std::path::PathBuf;

use tracing::{debug, warn};

use crate::annotation::TUMOR_LABEL;
use crate::filter::BackgroundFilter;
use crate::metadata::SlideCoordsMetadata;
use crate::output::StorageMode;
use crate::slide::{SlideEntry, SlideLayout, DEFAULT_REGION_CACHE_CAPACITY};
use crate::tiling::{RadiusExpander, RadiusShape};

/// Default tile edge in level-0 pixels.
pub const DEFAULT_PATCH_SIZE: u32 = 1024;

/// Default seed for shuffling and clustering.
pub const DEFAULT_SEED: u64 = 256;

/// Label of every tile taken by the entire-slide strategy.
pub const ENTIRE_SLIDE_LABEL: &str = "Mix";

/// Label of every tile taken by the mosaic strategy.
pub const MOSAIC_LABEL: &str = "Mosaic";

// =============================================================================
// Strategies
// =============================================================================

/// Radius expansion settings; the stride depends on the strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusSpec {
    pub radius: u32,
    pub shape: RadiusShape,
}

impl RadiusSpec {
    pub fn expander(&self, stride: u32) -> RadiusExpander {
        RadiusExpander::new(self.radius, stride, self.shape)
    }
}

/// Tiles guided by pathologist polygon annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationStrategy {
    /// Fraction of tile corners that must fall inside a polygon, in `(0, 1]`
    pub annotation_overlap: f64,

    /// Overlap between consecutive grid tiles, in `[0, 1)`
    pub patch_overlap: f64,

    /// Extra pixels added to the grid step
    pub stride: u32,

    /// Keep only Tumor regions
    pub tumor_only: bool,

    /// Slides are flat TMA cores padded by `round(patch_size * margin)`
    pub tma_margin: Option<f64>,

    pub radius: Option<RadiusSpec>,
    pub background: BackgroundFilter,
}

/// Every foreground tile of the slide, labelled [`ENTIRE_SLIDE_LABEL`].
#[derive(Debug, Clone, PartialEq)]
pub struct TilingStrategy {
    pub stride: u32,
    pub radius: Option<RadiusSpec>,
    pub background: BackgroundFilter,
}

/// Representative tiles chosen by two-stage clustering, labelled
/// [`MOSAIC_LABEL`].
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicStrategy {
    pub stride: u32,

    /// Edge length tiles are resized to before computing histograms
    pub evaluation_size: u32,

    pub n_clusters: usize,

    /// Fraction of each colour cluster kept, in `(0, 1]`
    pub percentage: f64,

    pub radius: Option<RadiusSpec>,
    pub background: BackgroundFilter,
}

/// Re-extracts previously recorded coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStrategy {
    pub coords: SlideCoordsMetadata,
    pub tumor_only: bool,
}

/// How tiles are chosen for each slide.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Annotation(AnnotationStrategy),
    EntireSlide(TilingStrategy),
    Mosaic(MosaicStrategy),
    SlideCoords(ReplayStrategy),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Annotation(_) => "annotation",
            Self::EntireSlide(_) => "entire-slide",
            Self::Mosaic(_) => "mosaic",
            Self::SlideCoords(_) => "slide-coords",
        }
    }
}

// =============================================================================
// Extraction Plan
// =============================================================================

/// Validated, immutable settings shared read-only by every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPlan {
    pub strategy: Strategy,
    pub patch_size: u32,

    /// Sizes every accepted tile is written at; never empty
    pub resize_sizes: Vec<u32>,

    pub seed: u64,
    pub max_slide_patches: Option<usize>,
    pub storage: StorageMode,
    pub patch_location: PathBuf,
    pub mask_overlap: f64,
    pub region_cache_capacity: usize,

    /// Where merged coordinates are persisted after the run
    pub coords_location: Option<PathBuf>,

    /// Store an overlay thumbnail of every slide that produced tiles
    pub store_thumbnail: bool,
}

impl ExtractionPlan {
    /// Plan with default settings for `strategy`.
    pub fn new(strategy: Strategy, patch_location: impl Into<PathBuf>) -> Self {
        Self {
            strategy,
            patch_size: DEFAULT_PATCH_SIZE,
            resize_sizes: vec![DEFAULT_PATCH_SIZE],
            seed: DEFAULT_SEED,
            max_slide_patches: None,
            storage: StorageMode::Png,
            patch_location: patch_location.into(),
            mask_overlap: crate::mask::DEFAULT_MASK_OVERLAP,
            region_cache_capacity: DEFAULT_REGION_CACHE_CAPACITY,
            coords_location: None,
            store_thumbnail: false,
        }
    }

    /// Set the patch size; resize sizes default to the patch size.
    pub fn with_patch_size(mut self, patch_size: u32) -> Self {
        self.patch_size = patch_size;
        self.resize_sizes = vec![patch_size];
        self
    }

    pub fn with_resize_sizes(mut self, resize_sizes: Vec<u32>) -> Self {
        if !resize_sizes.is_empty() {
            self.resize_sizes = resize_sizes;
        }
        self
    }

    pub fn with_max_slide_patches(mut self, max_slide_patches: Option<usize>) -> Self {
        self.max_slide_patches = max_slide_patches;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_coords_location(mut self, coords_location: Option<PathBuf>) -> Self {
        self.coords_location = coords_location;
        self
    }

    pub fn with_thumbnail(mut self, store_thumbnail: bool) -> Self {
        self.store_thumbnail = store_thumbnail;
        self
    }

    /// How slide files are opened under this plan.
    pub fn slide_layout(&self) -> SlideLayout {
        match &self.strategy {
            Strategy::Annotation(AnnotationStrategy {
                tma_margin: Some(margin),
                ..
            }) => SlideLayout::TmaCore {
                padding: tma_padding(self.patch_size, *margin),
            },
            _ => SlideLayout::WholeSlide,
        }
    }

    /// The label every tile carries, when the strategy does not derive labels
    /// from annotations or stored coordinates.
    pub fn fixed_label(&self) -> Option<&'static str> {
        match &self.strategy {
            Strategy::EntireSlide(_) => Some(ENTIRE_SLIDE_LABEL),
            Strategy::Mosaic(_) => Some(MOSAIC_LABEL),
            Strategy::Annotation(_) | Strategy::SlideCoords(_) => None,
        }
    }
}

/// Edge padding of a TMA core.
pub fn tma_padding(patch_size: u32, margin: f64) -> u32 {
    (f64::from(patch_size) * margin).round().max(0.0) as u32
}

// =============================================================================
// Job Selection
// =============================================================================

/// Keep the slides that have the guidance the strategy needs.
///
/// Slides without an annotation file (annotation strategy) or without
/// stored coordinates (slide-coords strategy) are skipped with a warning.
pub fn select_jobs(plan: &ExtractionPlan, entries: Vec<SlideEntry>) -> Vec<SlideEntry> {
    let total = entries.len();
    let jobs: Vec<SlideEntry> = entries
        .into_iter()
        .filter(|entry| match &plan.strategy {
            Strategy::Annotation(_) if entry.annotation.is_none() => {
                warn!(slide = %entry.name, "Skipping slide without annotation file");
                false
            }
            Strategy::SlideCoords(replay) => match replay.coords.get_slide(&entry.name) {
                None => {
                    warn!(slide = %entry.name, "Skipping slide without stored coordinates");
                    false
                }
                Some(coords) if replay.tumor_only && coords.coords(TUMOR_LABEL).is_empty() => {
                    debug!(slide = %entry.name, "Skipping slide without stored Tumor coordinates");
                    false
                }
                Some(_) => true,
            },
            _ => true,
        })
        .collect();

    debug!(selected = jobs.len(), total, "Selected slide jobs");
    jobs
}
