//! Per-slide extraction.
//!
//! A [`PerSlideExtractor`] runs the configured [`Strategy`] on one slide:
//!
//! ```text
//! SlideOpener ──► RegionCache ──┐
//! TissueMask (optional) ────────┼──► strategy pipeline ──► PatchSink
//! AnnotationIndex (annotation) ─┘            │
//!                                            ▼
//!                                     CoordsMetadata
//! ```
//!
//! The extractor is shared read-only between workers; every call to
//! [`PerSlideExtractor::extract`] owns its reader, mask, sink and
//! accumulator.

mod pipeline;
mod plan;

use std::sync::Arc;

use tracing::{debug, info};

use crate::annotation::{load_annotations, AnnotationIndex};
use crate::error::ExtractError;
use crate::mask::TissueMask;
use crate::metadata::CoordsMetadata;
use crate::output::open_sink;
use crate::slide::{RegionCache, SlideEntry, SlideLayout, SlideOpener};

use pipeline::SlideContext;
pub use pipeline::SlideStats;
pub use plan::{
    select_jobs, tma_padding, AnnotationStrategy, ExtractionPlan, MosaicStrategy, RadiusSpec,
    ReplayStrategy, Strategy, TilingStrategy, DEFAULT_PATCH_SIZE, DEFAULT_SEED,
    ENTIRE_SLIDE_LABEL, MOSAIC_LABEL,
};

/// Runs one strategy on one slide at a time.
pub struct PerSlideExtractor {
    plan: Arc<ExtractionPlan>,
    opener: Arc<dyn SlideOpener>,
}

impl PerSlideExtractor {
    pub fn new(plan: Arc<ExtractionPlan>, opener: Arc<dyn SlideOpener>) -> Self {
        Self { plan, opener }
    }

    pub fn plan(&self) -> &ExtractionPlan {
        &self.plan
    }

    /// Extract the tiles of one slide.
    ///
    /// Returns `Ok(None)` when the strategy produced nothing for the slide
    /// (a mosaic slide with fewer tissue tiles than clusters).
    ///
    /// # Errors
    ///
    /// Returns an error if the slide, its annotation or mask cannot be read,
    /// or if a patch cannot be written.
    pub fn extract(&self, entry: &SlideEntry) -> Result<Option<CoordsMetadata>, ExtractError> {
        let plan = self.plan.as_ref();
        info!(slide = %entry.name, strategy = plan.strategy.name(), "Extracting slide");

        let layout = plan.slide_layout();
        let reader = self.opener.open(&entry.path, layout)?;
        let dimensions = reader.dimensions();
        let reader = RegionCache::with_capacity(reader, plan.region_cache_capacity);

        let mask = entry
            .mask
            .as_deref()
            .map(|path| TissueMask::load(path, plan.mask_overlap, plan.patch_size, dimensions))
            .transpose()?;
        let sink = open_sink(plan.storage, &plan.patch_location, &entry.name)?;
        let mut ctx = SlideContext::new(plan, entry, reader, mask, sink);

        let mut outlines = None;
        let produced = match &plan.strategy {
            Strategy::Annotation(strategy) => {
                let index = self.annotation_index(entry, strategy, layout)?;
                pipeline::extract_annotated(&mut ctx, strategy, &index)?;
                outlines = Some(index);
                true
            }
            Strategy::EntireSlide(strategy) => {
                pipeline::extract_entire_slide(&mut ctx, strategy)?;
                true
            }
            Strategy::Mosaic(strategy) => pipeline::extract_mosaic(&mut ctx, strategy)?,
            Strategy::SlideCoords(strategy) => {
                pipeline::extract_replay(&mut ctx, strategy)?;
                true
            }
        };

        if plan.store_thumbnail && produced {
            let path = ctx.store_thumbnail(outlines.as_ref())?;
            debug!(slide = %entry.name, path = %path.display(), "Stored thumbnail");
        }

        let (coords, stats) = ctx.finish()?;
        info!(slide = %entry.name, %stats, "Finished slide");
        Ok(produced.then_some(coords))
    }

    fn annotation_index(
        &self,
        entry: &SlideEntry,
        strategy: &AnnotationStrategy,
        layout: SlideLayout,
    ) -> Result<AnnotationIndex, ExtractError> {
        let path = entry
            .annotation
            .as_deref()
            .ok_or_else(|| ExtractError::MissingGuidance {
                slide: entry.name.clone(),
            })?;
        let mut regions = load_annotations(path)?;
        if let SlideLayout::TmaCore { padding } = layout {
            let offset = f64::from(padding);
            regions = regions
                .into_iter()
                .map(|region| region.translated(offset, offset))
                .collect();
        }
        Ok(AnnotationIndex::new(regions, strategy.annotation_overlap).tumor_only(strategy.tumor_only))
    }
}
