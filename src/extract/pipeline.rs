//! Per-slide tile pipelines.
//!
//! Every strategy runs against a [`SlideContext`], which owns the slide
//! reader, the optional tissue mask, the patch sink and the coordinate
//! accumulator of one worker.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info, warn};

use super::plan::{
    AnnotationStrategy, ExtractionPlan, MosaicStrategy, ReplayStrategy, TilingStrategy,
    ENTIRE_SLIDE_LABEL, MOSAIC_LABEL,
};
use crate::annotation::{AnnotationIndex, TUMOR_LABEL};
use crate::error::ExtractError;
use crate::filter::BackgroundFilter;
use crate::mask::{self, TissueMask};
use crate::metadata::CoordsMetadata;
use crate::mosaic::{color_histogram, MosaicSelection, MosaicSelector, TileHistogram};
use crate::output::{resize_patch, PatchKey, PatchSink, SlideThumbnail, THUMBNAIL_MAX_SIDE};
use crate::slide::{RegionCache, SlideEntry};
use crate::tiling::{RadiusExpander, TileGrid};

// =============================================================================
// Statistics
// =============================================================================

/// Counters reported at the end of each slide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlideStats {
    /// Grid positions visited
    pub candidates: usize,
    /// Positions that passed the mask and label checks
    pub labelled: usize,
    /// Positions whose pixels passed the background filter
    pub tissue: usize,
    /// Mosaic representatives
    pub selected: usize,
    /// Coordinates recorded
    pub accepted: usize,
}

impl fmt::Display for SlideStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidates, {} labelled, {} tissue, {} selected, {} accepted",
            self.candidates, self.labelled, self.tissue, self.selected, self.accepted
        )
    }
}

// =============================================================================
// Slide Context
// =============================================================================

/// Resources owned by the worker extracting one slide.
pub(crate) struct SlideContext<'a> {
    plan: &'a ExtractionPlan,
    entry: &'a SlideEntry,
    reader: RegionCache,
    mask: Option<TissueMask>,
    sink: Box<dyn PatchSink>,
    coords: CoordsMetadata,
    stats: SlideStats,
}

impl<'a> SlideContext<'a> {
    pub(crate) fn new(
        plan: &'a ExtractionPlan,
        entry: &'a SlideEntry,
        reader: RegionCache,
        mask: Option<TissueMask>,
        sink: Box<dyn PatchSink>,
    ) -> Self {
        Self {
            plan,
            entry,
            reader,
            mask,
            sink,
            coords: CoordsMetadata::new(entry.name.clone(), plan.patch_size),
            stats: SlideStats::default(),
        }
    }

    fn patch_size(&self) -> u32 {
        self.plan.patch_size
    }

    fn dimensions(&self) -> (u32, u32) {
        self.reader.dimensions()
    }

    fn at_cap(&self) -> bool {
        self.plan
            .max_slide_patches
            .is_some_and(|cap| self.coords.len() >= cap)
    }

    fn on_tissue(&self, x: u32, y: u32) -> bool {
        mask::passes(self.mask.as_ref(), x, y)
    }

    fn fetch(&mut self, x: u32, y: u32) -> Result<Arc<RgbImage>, ExtractError> {
        Ok(self.reader.read(x, y, self.plan.patch_size)?)
    }

    /// Write `patch` at every resize size and record the coordinate.
    fn store(&mut self, label: &str, x: u32, y: u32, patch: &RgbImage) -> Result<(), ExtractError> {
        for &size in &self.plan.resize_sizes {
            let key = PatchKey::new(label, &self.entry.slide_id, self.plan.patch_size, size, x, y);
            self.sink.write(&key, &resize_patch(patch, size))?;
        }
        if self.coords.add_coord(label, x, y) {
            self.stats.accepted += 1;
        }
        Ok(())
    }

    /// Render the slide with the accepted tiles and `outlines` overlaid and
    /// store it below the patch root.
    pub(crate) fn store_thumbnail(
        &self,
        outlines: Option<&AnnotationIndex>,
    ) -> Result<PathBuf, ExtractError> {
        let image = self.reader.thumbnail(THUMBNAIL_MAX_SIDE)?;
        let mut thumbnail = SlideThumbnail::new(image, self.dimensions());
        for (label, polygon) in outlines.into_iter().flat_map(|index| index.outlines()) {
            thumbnail.draw_outline(label, polygon);
        }
        thumbnail.draw_patches(&self.coords);
        Ok(thumbnail.save(&self.plan.patch_location, &self.entry.name)?)
    }

    /// Flush the sink and hand back the accumulated coordinates.
    pub(crate) fn finish(mut self) -> Result<(CoordsMetadata, SlideStats), ExtractError> {
        self.sink.finish()?;
        let (hits, misses) = self.reader.stats();
        debug!(
            slide = %self.entry.name,
            hits,
            misses,
            written = self.sink.written(),
            "Slide reader cache"
        );
        Ok((self.coords, self.stats))
    }
}

// =============================================================================
// Sliding Window
// =============================================================================

/// Where the labels of a tile come from.
pub(crate) enum Labeler<'a> {
    Annotations(&'a AnnotationIndex),
    Fixed(&'static str),
}

impl Labeler<'_> {
    fn labels_for(&self, x: u32, y: u32, patch_size: u32) -> Vec<&str> {
        match self {
            Self::Annotations(index) => index.labels_for(x, y, patch_size),
            Self::Fixed(label) => vec![*label],
        }
    }
}

/// Shared grid walk of the annotation and entire-slide strategies.
///
/// For each grid position: mask, labels, then the background check of the
/// position itself gates all of its radius candidates. Each candidate is
/// re-validated and written once per label.
fn run_sliding_window(
    ctx: &mut SlideContext<'_>,
    grid: &TileGrid,
    labeler: &Labeler<'_>,
    radius: Option<RadiusExpander>,
    filter: &BackgroundFilter,
) -> Result<(), ExtractError> {
    let patch_size = ctx.patch_size();
    let bounds = ctx.dimensions();

    for pos in grid {
        if ctx.at_cap() {
            debug!(slide = %ctx.entry.name, "Reached max slide patches");
            break;
        }
        ctx.stats.candidates += 1;

        let (x, y) = (pos.x, pos.y);
        if !ctx.on_tissue(x, y) || labeler.labels_for(x, y, patch_size).is_empty() {
            continue;
        }
        ctx.stats.labelled += 1;

        let candidates = match radius {
            Some(expander) => expander.neighbors((x, y), patch_size, bounds),
            None => vec![(x, y)],
        };

        let primary = ctx.fetch(x, y)?;
        if !filter.is_foreground(&primary) {
            continue;
        }
        ctx.stats.tissue += 1;

        for (cx, cy) in candidates {
            if ctx.at_cap() {
                break;
            }
            if !ctx.on_tissue(cx, cy) {
                continue;
            }
            let pending: Vec<&str> = labeler
                .labels_for(cx, cy, patch_size)
                .into_iter()
                .filter(|label| !ctx.coords.contains(label, cx, cy))
                .collect();
            if pending.is_empty() {
                continue;
            }

            let patch = ctx.fetch(cx, cy)?;
            if !filter.is_foreground(&patch) {
                continue;
            }
            for label in pending {
                if ctx.at_cap() {
                    break;
                }
                ctx.store(label, cx, cy, &patch)?;
            }
        }
    }
    Ok(())
}

// =============================================================================
// Strategies
// =============================================================================

/// Annotation-guided extraction.
pub(crate) fn extract_annotated(
    ctx: &mut SlideContext<'_>,
    strategy: &AnnotationStrategy,
    index: &AnnotationIndex,
) -> Result<(), ExtractError> {
    let (width, height) = ctx.dimensions();
    let patch_size = ctx.patch_size();

    let mut grid = TileGrid::new(width, height, patch_size)
        .with_overlap(strategy.patch_overlap)
        .with_stride(strategy.stride);
    if ctx.plan.max_slide_patches.is_some() {
        grid = grid.shuffled(ctx.plan.seed);
    }

    let radius_stride = (f64::from(patch_size) * (1.0 - strategy.patch_overlap)).round() as u32;
    let radius = strategy.radius.map(|spec| spec.expander(radius_stride));

    run_sliding_window(
        ctx,
        &grid,
        &Labeler::Annotations(index),
        radius,
        &strategy.background,
    )
}

/// Every foreground tile, labelled `Mix`.
pub(crate) fn extract_entire_slide(
    ctx: &mut SlideContext<'_>,
    strategy: &TilingStrategy,
) -> Result<(), ExtractError> {
    let (width, height) = ctx.dimensions();
    let patch_size = ctx.patch_size();

    let mut grid = TileGrid::new(width, height, patch_size).with_stride(strategy.stride);
    if ctx.plan.max_slide_patches.is_some() {
        grid = grid.shuffled(ctx.plan.seed);
    }
    let radius = strategy.radius.map(|spec| spec.expander(patch_size));

    run_sliding_window(
        ctx,
        &grid,
        &Labeler::Fixed(ENTIRE_SLIDE_LABEL),
        radius,
        &strategy.background,
    )
}

/// Representative tiles, labelled `Mosaic`.
///
/// Returns `false` when the slide has fewer tissue tiles than colour
/// clusters, in which case nothing is written.
pub(crate) fn extract_mosaic(
    ctx: &mut SlideContext<'_>,
    strategy: &MosaicStrategy,
) -> Result<bool, ExtractError> {
    let (width, height) = ctx.dimensions();
    let patch_size = ctx.patch_size();
    let grid = TileGrid::new(width, height, patch_size).with_stride(strategy.stride);

    let mut tiles = Vec::new();
    for pos in &grid {
        if !ctx.on_tissue(pos.x, pos.y) {
            continue;
        }
        ctx.stats.candidates += 1;
        let patch = ctx.fetch(pos.x, pos.y)?;
        if strategy.background.is_foreground(&patch) {
            ctx.stats.tissue += 1;
            tiles.push(TileHistogram {
                x: pos.x,
                y: pos.y,
                histogram: color_histogram(&patch, strategy.evaluation_size),
            });
        }
    }

    let selector = MosaicSelector::new(strategy.n_clusters, strategy.percentage, ctx.plan.seed);
    let representatives = match selector.select(&tiles) {
        MosaicSelection::Insufficient { tiles, n_clusters } => {
            info!(
                slide = %ctx.entry.name,
                tiles,
                n_clusters,
                "No patches can be selected: fewer tissue tiles than clusters"
            );
            return Ok(false);
        }
        MosaicSelection::Selected(coords) => coords,
    };
    ctx.stats.selected = representatives.len();

    let radius = strategy.radius.map(|spec| spec.expander(patch_size));
    let bounds = (width, height);
    for (x, y) in representatives {
        let candidates = match radius {
            Some(expander) => expander.neighbors((x, y), patch_size, bounds),
            None => vec![(x, y)],
        };
        for (cx, cy) in candidates {
            if ctx.at_cap() {
                return Ok(true);
            }
            if !ctx.on_tissue(cx, cy) || ctx.coords.contains(MOSAIC_LABEL, cx, cy) {
                continue;
            }
            let patch = ctx.fetch(cx, cy)?;
            if strategy.background.is_foreground(&patch) {
                ctx.store(MOSAIC_LABEL, cx, cy, &patch)?;
            }
        }
    }
    Ok(true)
}

/// Re-extract stored coordinates for this slide.
pub(crate) fn extract_replay(
    ctx: &mut SlideContext<'_>,
    strategy: &ReplayStrategy,
) -> Result<(), ExtractError> {
    let Some(stored) = strategy.coords.get_slide(&ctx.entry.name) else {
        return Err(ExtractError::MissingGuidance {
            slide: ctx.entry.name.clone(),
        });
    };
    let (width, height) = ctx.dimensions();
    let patch_size = ctx.patch_size();

    for (label, coords) in stored.iter() {
        if strategy.tumor_only && label != TUMOR_LABEL {
            continue;
        }
        for &(x, y) in coords {
            if ctx.at_cap() {
                return Ok(());
            }
            ctx.stats.candidates += 1;
            if u64::from(x) + u64::from(patch_size) > u64::from(width)
                || u64::from(y) + u64::from(patch_size) > u64::from(height)
            {
                warn!(slide = %ctx.entry.name, label, x, y, "Stored coordinate outside slide");
                continue;
            }
            let patch = ctx.fetch(x, y)?;
            ctx.store(label, x, y, &patch)?;
        }
    }
    Ok(())
}
