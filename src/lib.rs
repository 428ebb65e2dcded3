//! # wsi-patcher
//!
//! Extracts fixed-size, labelled, foreground training patches from Whole
//! Slide Images.
//!
//! Each slide is tiled on a regular grid. Candidate tiles are labelled from
//! pathologist polygon annotations, a fixed label, or coordinates saved by an
//! earlier run; filtered against an optional tissue mask and against blank
//! background; optionally expanded to their neighbours; and written as PNG
//! files or per-slide archives. Accepted coordinates of every slide are merged
//! into one JSON document that a later run can replay.
//!
//! ## Architecture
//!
//! - [`tiling`] - Grid iteration, corner sampling and radius expansion
//! - [`annotation`] - Polygon annotation parsing and label lookup
//! - [`mask`] - Raster and polygon tissue masks
//! - [`filter`] - Blank background rejection
//! - [`mosaic`] - Two-stage k-means representative sampling
//! - [`slide`] - Slide readers, region cache and slide discovery
//! - [`output`] - Patch layout, encoding, storage sinks and slide thumbnails
//! - [`metadata`] - Per-slide and merged coordinate metadata
//! - [`extract`] - Extraction strategies run on one slide
//! - [`coordinator`] - Batched parallel execution over many slides
//! - [`config`] - CLI and validation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use wsi_patcher::extract::{ExtractionPlan, PerSlideExtractor, Strategy, TilingStrategy};
//! use wsi_patcher::filter::BackgroundFilter;
//! use wsi_patcher::slide::{ImageFileOpener, SlideEntry};
//! use wsi_patcher::ExtractionCoordinator;
//!
//! #[tokio::main]
//! async fn main() {
//!     let strategy = Strategy::EntireSlide(TilingStrategy {
//!         stride: 0,
//!         radius: None,
//!         background: BackgroundFilter::default(),
//!     });
//!     let plan = ExtractionPlan::new(strategy, "patches").with_patch_size(512);
//!     let extractor = PerSlideExtractor::new(Arc::new(plan), Arc::new(ImageFileOpener));
//!
//!     let jobs = vec![SlideEntry::new("slides/POLE/VOA-1.png", "POLE/VOA-1")];
//!     let report = ExtractionCoordinator::new(Arc::new(extractor), 4)
//!         .run(jobs)
//!         .await
//!         .unwrap();
//!     println!("{}", report.summary);
//! }
//! ```

pub mod annotation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod filter;
pub mod mask;
pub mod metadata;
pub mod mosaic;
pub mod output;
pub mod slide;
pub mod tiling;

// Re-export commonly used types
pub use annotation::{AnnotationIndex, AnnotationRegion};
pub use config::{Cli, Command, RunConfig};
pub use coordinator::{ExtractionCoordinator, RunReport, RunSummary, MAX_WORKERS};
pub use error::{
    AnnotationError, CatalogError, ConfigError, CoordinatorError, ExtractError, MaskError,
    MetadataError, SlideError, WriterError,
};
pub use extract::{ExtractionPlan, PerSlideExtractor, SlideStats, Strategy};
pub use filter::BackgroundFilter;
pub use mask::TissueMask;
pub use metadata::{CoordsMetadata, SlideCoordsMetadata};
pub use mosaic::MosaicSelector;
pub use output::{PatchKey, PatchSink, StorageMode};
pub use slide::{ImageFileOpener, SlideEntry, SlideOpener, SlideReader};
pub use tiling::{RadiusExpander, TileGrid};
