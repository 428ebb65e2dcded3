//! Command-line configuration for wsi-patcher.
//!
//! Options come from the command line or from environment variables with the
//! `WSIP_` prefix. The subcommand selects the extraction strategy:
//!
//! - `annotation` - tiles inside polygon annotations
//! - `entire-slide` - every foreground tile
//! - `mosaic` - representative tiles chosen by clustering
//! - `slide-coords` - replay coordinates saved by an earlier run
//!
//! [`Cli::into_run`] validates everything before any slide is touched.
//!
//! # Environment Variables
//!
//! - `WSIP_PATCH_LOCATION` - Root directory of written patches (required)
//! - `WSIP_SLIDE_LOCATION` - Root directory of slide files
//! - `WSIP_SLIDE_PATTERN` - Directory levels between root and slide (default: subtype)
//! - `WSIP_MANIFEST_LOCATION` - Tab-separated slide manifest
//! - `WSIP_MASK_LOCATION` - Directory of tissue masks
//! - `WSIP_SEED` - Shuffle and clustering seed (default: 256)
//! - `WSIP_WORKERS` - Concurrent slide workers (default: CPU count)
//! - `WSIP_STORAGE` - `png`, `archive` or `none` (default: png)
//! - `WSIP_STORE_THUMBNAIL` - Write an overlay thumbnail per slide

use std::fmt::Display;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::annotation::DEFAULT_ANNOTATION_OVERLAP;
use crate::coordinator::effective_workers;
use crate::error::ConfigError;
use crate::extract::{
    AnnotationStrategy, ExtractionPlan, MosaicStrategy, RadiusSpec, ReplayStrategy, Strategy,
    TilingStrategy, DEFAULT_PATCH_SIZE, DEFAULT_SEED,
};
use crate::filter::BackgroundFilter;
use crate::mask::DEFAULT_MASK_OVERLAP;
use crate::metadata::SlideCoordsMetadata;
use crate::mosaic::{DEFAULT_N_CLUSTERS, DEFAULT_PERCENTAGE};
use crate::output::StorageMode;
use crate::slide::catalog::DEFAULT_SLIDE_PATTERN;
use crate::slide::{CatalogConfig, SlideSource, DEFAULT_REGION_CACHE_CAPACITY};
use crate::tiling::RadiusShape;

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-patcher - Extract training patches from Whole Slide Images.
///
/// Tiles are labelled from polygon annotations, a fixed label or stored
/// coordinates, filtered against blank background and optional tissue masks,
/// and written as PNG files or per-slide archives.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-patcher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every strategy.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    // =========================================================================
    // Input
    // =========================================================================
    /// Root directory of the slide files.
    #[arg(long, env = "WSIP_SLIDE_LOCATION")]
    pub slide_location: Option<PathBuf>,

    /// Directory levels between the slide root and each slide, `/`-separated.
    ///
    /// Used to build slide ids; an empty pattern uses the file stem alone.
    #[arg(long, default_value = DEFAULT_SLIDE_PATTERN, env = "WSIP_SLIDE_PATTERN")]
    pub slide_pattern: String,

    /// Tab-separated manifest listing slides instead of a slide directory.
    #[arg(long, env = "WSIP_MANIFEST_LOCATION")]
    pub manifest_location: Option<PathBuf>,

    /// Directory of `<slide>.png` raster masks or `<slide>.txt` polygon masks.
    #[arg(long, env = "WSIP_MASK_LOCATION")]
    pub mask_location: Option<PathBuf>,

    /// Fraction of tile corners that must lie on tissue in the mask.
    #[arg(long, default_value_t = DEFAULT_MASK_OVERLAP, env = "WSIP_MASK_OVERLAP")]
    pub mask_overlap: f64,

    // =========================================================================
    // Output
    // =========================================================================
    /// Root directory patches are written to.
    #[arg(long, env = "WSIP_PATCH_LOCATION")]
    pub patch_location: PathBuf,

    /// How patches are stored.
    #[arg(long, value_enum, default_value_t = StorageMode::Png, env = "WSIP_STORAGE")]
    pub storage: StorageMode,

    /// Also write `<patch-location>/thumbnails/<slide>.png` with the accepted
    /// tiles and annotations drawn over the slide.
    #[arg(long, env = "WSIP_STORE_THUMBNAIL")]
    pub store_thumbnail: bool,

    // =========================================================================
    // Execution
    // =========================================================================
    /// Seed for grid shuffling and clustering.
    #[arg(long, default_value_t = DEFAULT_SEED, env = "WSIP_SEED")]
    pub seed: u64,

    /// Number of slides extracted concurrently (default: CPU count).
    #[arg(long, env = "WSIP_WORKERS")]
    pub workers: Option<usize>,

    /// Only process the N-th (1-based) group of `workers` slides.
    #[arg(long, env = "WSIP_SLIDE_IDX")]
    pub slide_idx: Option<usize>,

    /// Decoded regions cached per worker.
    #[arg(long, default_value_t = DEFAULT_REGION_CACHE_CAPACITY, env = "WSIP_REGION_CACHE")]
    pub region_cache: usize,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Extraction strategy.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract tiles inside pathologist polygon annotations.
    Annotation(AnnotationArgs),

    /// Extract every foreground tile, labelled `Mix`.
    EntireSlide(TilingArgs),

    /// Extract representative tiles chosen by colour and spatial clustering.
    Mosaic(MosaicArgs),

    /// Re-extract coordinates saved by an earlier run.
    SlideCoords(SlideCoordsArgs),
}

/// Grid and output options of the sliding-window strategies.
#[derive(Args, Debug, Clone)]
pub struct TilingArgs {
    /// Tile edge in level-0 pixels.
    #[arg(long, default_value_t = DEFAULT_PATCH_SIZE)]
    pub patch_size: u32,

    /// Sizes every tile is written at, comma-separated (default: patch size).
    #[arg(long, value_delimiter = ',')]
    pub resize_sizes: Vec<u32>,

    /// Stop each slide after this many accepted coordinates.
    ///
    /// The grid is shuffled with the seed when set.
    #[arg(long)]
    pub max_slide_patches: Option<usize>,

    /// Extra pixels added to the grid step.
    #[arg(long, default_value_t = 0)]
    pub stride: u32,

    /// Also take the neighbours of each accepted tile within this many steps.
    #[arg(long)]
    pub radius: Option<u32>,

    /// Neighbourhood shape used with `--radius`.
    #[arg(long, value_enum, default_value_t = RadiusShape::Circle)]
    pub radius_shape: RadiusShape,

    /// Reject tiles whose blank pixel fraction reaches this value.
    #[arg(long)]
    pub blank_percent: Option<f32>,

    /// Save the extracted coordinates to this JSON file.
    #[arg(long)]
    pub slide_coords_location: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AnnotationArgs {
    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Directory of `<slide>.txt` annotation files.
    ///
    /// Required with `--slide-location`; a manifest lists annotations itself.
    #[arg(long, env = "WSIP_ANNOTATION_LOCATION")]
    pub annotation_location: Option<PathBuf>,

    /// Fraction of tile corners that must lie inside a polygon.
    #[arg(long, default_value_t = DEFAULT_ANNOTATION_OVERLAP)]
    pub annotation_overlap: f64,

    /// Overlap between consecutive grid tiles.
    #[arg(long, default_value_t = 0.0)]
    pub patch_overlap: f64,

    /// Only extract Tumor regions.
    #[arg(long)]
    pub is_tumor: bool,

    /// Slides are tissue microarray cores, padded before tiling.
    #[arg(long)]
    pub is_tma: bool,

    /// Core padding as a fraction of the patch size (default: annotation overlap).
    #[arg(long, requires = "is_tma")]
    pub tma_margin: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct MosaicArgs {
    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Edge length tiles are resized to before clustering (default: patch size / 8).
    #[arg(long)]
    pub evaluation_size: Option<u32>,

    /// Number of colour clusters.
    #[arg(long, default_value_t = DEFAULT_N_CLUSTERS)]
    pub n_clusters: usize,

    /// Fraction of each colour cluster kept.
    #[arg(long, default_value_t = DEFAULT_PERCENTAGE)]
    pub percentage: f64,
}

#[derive(Args, Debug, Clone)]
pub struct SlideCoordsArgs {
    /// JSON file written by an earlier run.
    #[arg(long, env = "WSIP_LOAD_SLIDE_COORDS")]
    pub load_slide_coords: PathBuf,

    /// Only replay Tumor coordinates.
    #[arg(long)]
    pub is_tumor: bool,

    /// Stop each slide after this many coordinates.
    #[arg(long)]
    pub max_slide_patches: Option<usize>,
}

// =============================================================================
// Validated Run Configuration
// =============================================================================

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub plan: ExtractionPlan,
    pub catalog: CatalogConfig,
    pub workers: usize,
    pub slide_idx: Option<usize>,
    pub verbose: bool,
}

impl Cli {
    /// Validate the arguments and build the run configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for out-of-range values, incompatible options
    /// or unreadable stored coordinates.
    pub fn into_run(self) -> Result<RunConfig, ConfigError> {
        let Cli { common, command } = self;
        common.validate()?;

        let mut annotation_location = None;
        let plan = match command {
            Command::Annotation(args) => {
                annotation_location = args.annotation_location.clone();
                annotation_plan(args, &common)?
            }
            Command::EntireSlide(tiling) => {
                tiling.validate()?;
                let strategy = Strategy::EntireSlide(TilingStrategy {
                    stride: tiling.stride,
                    radius: tiling.radius_spec(),
                    background: tiling.background(BackgroundFilter::default()),
                });
                tiling.apply(ExtractionPlan::new(strategy, &common.patch_location))
            }
            Command::Mosaic(args) => mosaic_plan(args, &common)?,
            Command::SlideCoords(args) => replay_plan(args, &common)?,
        };

        let mut plan = plan
            .with_seed(common.seed)
            .with_storage(common.storage)
            .with_thumbnail(common.store_thumbnail);
        plan.mask_overlap = common.mask_overlap;
        plan.region_cache_capacity = common.region_cache;

        // A manifest carries its own annotation column; a slide directory does not.
        let source = common.slide_source()?;
        if matches!(plan.strategy, Strategy::Annotation(_))
            && annotation_location.is_none()
            && matches!(source, SlideSource::Directory { .. })
        {
            return Err(ConfigError::Incompatible(
                "annotation requires --annotation-location when slides come from --slide-location"
                    .to_string(),
            ));
        }

        Ok(RunConfig {
            plan,
            catalog: CatalogConfig {
                source,
                annotation_location,
                mask_location: common.mask_location,
            },
            workers: effective_workers(common.workers, num_cpus::get()),
            slide_idx: common.slide_idx,
            verbose: common.verbose,
        })
    }
}

fn annotation_plan(args: AnnotationArgs, common: &CommonArgs) -> Result<ExtractionPlan, ConfigError> {
    args.tiling.validate()?;
    ensure(
        args.annotation_overlap > 0.0 && args.annotation_overlap <= 1.0,
        "annotation-overlap",
        args.annotation_overlap,
        "a value in (0, 1]",
    )?;
    ensure(
        (0.0..1.0).contains(&args.patch_overlap),
        "patch-overlap",
        args.patch_overlap,
        "a value in [0, 1)",
    )?;
    let tma_margin = args
        .is_tma
        .then(|| args.tma_margin.unwrap_or(args.annotation_overlap));
    if let Some(margin) = tma_margin {
        ensure(margin >= 0.0, "tma-margin", margin, "a non-negative value")?;
    }

    let tiling = &args.tiling;
    let strategy = Strategy::Annotation(AnnotationStrategy {
        annotation_overlap: args.annotation_overlap,
        patch_overlap: args.patch_overlap,
        stride: tiling.stride,
        tumor_only: args.is_tumor,
        tma_margin,
        radius: tiling.radius_spec(),
        background: tiling.background(BackgroundFilter::for_annotation_overlap(
            args.annotation_overlap,
        )),
    });
    Ok(tiling.apply(ExtractionPlan::new(strategy, &common.patch_location)))
}

fn mosaic_plan(args: MosaicArgs, common: &CommonArgs) -> Result<ExtractionPlan, ConfigError> {
    args.tiling.validate()?;
    ensure(args.n_clusters > 0, "n-clusters", args.n_clusters, "a positive count")?;
    ensure(
        args.percentage > 0.0 && args.percentage <= 1.0,
        "percentage",
        args.percentage,
        "a value in (0, 1]",
    )?;
    let evaluation_size = args
        .evaluation_size
        .unwrap_or((args.tiling.patch_size / 8).max(1));
    ensure(evaluation_size > 0, "evaluation-size", evaluation_size, "a positive size")?;

    let tiling = &args.tiling;
    let strategy = Strategy::Mosaic(MosaicStrategy {
        stride: tiling.stride,
        evaluation_size,
        n_clusters: args.n_clusters,
        percentage: args.percentage,
        radius: tiling.radius_spec(),
        background: tiling.background(BackgroundFilter::default()),
    });
    Ok(tiling.apply(ExtractionPlan::new(strategy, &common.patch_location)))
}

fn replay_plan(args: SlideCoordsArgs, common: &CommonArgs) -> Result<ExtractionPlan, ConfigError> {
    let coords = SlideCoordsMetadata::load(&args.load_slide_coords)?;
    let patch_size = coords.patch_size();
    ensure(patch_size > 0, "load-slide-coords", patch_size, "a positive stored patch size")?;
    let resize_sizes = coords.resize_sizes().to_vec();

    let strategy = Strategy::SlideCoords(ReplayStrategy {
        coords,
        tumor_only: args.is_tumor,
    });
    Ok(ExtractionPlan::new(strategy, &common.patch_location)
        .with_patch_size(patch_size)
        .with_resize_sizes(resize_sizes)
        .with_max_slide_patches(args.max_slide_patches))
}

impl CommonArgs {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            self.mask_overlap > 0.0 && self.mask_overlap <= 1.0,
            "mask-overlap",
            self.mask_overlap,
            "a value in (0, 1]",
        )?;
        if let Some(workers) = self.workers {
            ensure(workers > 0, "workers", workers, "a positive count")?;
        }
        if let Some(idx) = self.slide_idx {
            ensure(idx > 0, "slide-idx", idx, "a 1-based index")?;
        }
        Ok(())
    }

    fn slide_source(&self) -> Result<SlideSource, ConfigError> {
        match (&self.slide_location, &self.manifest_location) {
            (Some(root), None) => Ok(SlideSource::Directory {
                root: root.clone(),
                pattern: self.slide_pattern.clone(),
            }),
            (None, Some(path)) => Ok(SlideSource::Manifest { path: path.clone() }),
            (Some(_), Some(_)) => Err(ConfigError::Incompatible(
                "--slide-location and --manifest-location are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ConfigError::Incompatible(
                "one of --slide-location or --manifest-location is required".to_string(),
            )),
        }
    }
}

impl TilingArgs {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.patch_size > 0, "patch-size", self.patch_size, "a positive size")?;
        for &size in &self.resize_sizes {
            ensure(
                size > 0 && size <= self.patch_size,
                "resize-sizes",
                size,
                "sizes in [1, patch size]",
            )?;
        }
        if let Some(radius) = self.radius {
            ensure(radius > 0, "radius", radius, "a positive number of steps")?;
        }
        if let Some(blank) = self.blank_percent {
            ensure(
                blank > 0.0 && blank <= 1.0,
                "blank-percent",
                blank,
                "a value in (0, 1]",
            )?;
        }
        Ok(())
    }

    fn radius_spec(&self) -> Option<RadiusSpec> {
        self.radius.map(|radius| RadiusSpec {
            radius,
            shape: self.radius_shape,
        })
    }

    fn background(&self, default: BackgroundFilter) -> BackgroundFilter {
        self.blank_percent.map_or(default, BackgroundFilter::new)
    }

    fn apply(&self, plan: ExtractionPlan) -> ExtractionPlan {
        plan.with_patch_size(self.patch_size)
            .with_resize_sizes(self.resize_sizes.clone())
            .with_max_slide_patches(self.max_slide_patches)
            .with_coords_location(self.slide_coords_location.clone())
    }
}

fn ensure(
    ok: bool,
    name: &'static str,
    value: impl Display,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value: value.to_string(),
            expected,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
