//! wsi-patcher - Extract training patches from Whole Slide Images.
//!
//! This binary parses the CLI, discovers slides and runs the coordinator.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_patcher::{
    config::{Cli, RunConfig},
    extract::{select_jobs, PerSlideExtractor},
    slide::catalog::{discover, select_chunk},
    ExtractionCoordinator, ImageFileOpener,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.common.verbose);

    let run = match cli.into_run() {
        Ok(run) => run,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    run_extraction(run).await
}

async fn run_extraction(run: RunConfig) -> ExitCode {
    let RunConfig {
        plan,
        catalog,
        workers,
        slide_idx,
        ..
    } = run;

    info!("Configuration:");
    info!("  Strategy: {}", plan.strategy.name());
    info!("  Patch size: {} (resized to {:?})", plan.patch_size, plan.resize_sizes);
    info!("  Patch location: {}", plan.patch_location.display());
    info!("  Storage: {:?}", plan.storage);
    info!("  Workers: {}", workers);
    if plan.store_thumbnail {
        info!("  Thumbnails: {}/thumbnails", plan.patch_location.display());
    }
    if let Some(cap) = plan.max_slide_patches {
        info!("  Max patches per slide: {} (seed {})", cap, plan.seed);
    }

    let mut entries = match discover(&catalog) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Slide discovery failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Discovered {} slide(s)", entries.len());

    if let Some(idx) = slide_idx {
        entries = select_chunk(entries, idx, workers);
        info!("Slide index {}: {} slide(s) selected", idx, entries.len());
    }

    let jobs = select_jobs(&plan, entries);
    if jobs.is_empty() {
        warn!("No slides to extract");
        return ExitCode::SUCCESS;
    }

    let extractor = PerSlideExtractor::new(Arc::new(plan), Arc::new(ImageFileOpener));
    let coordinator = ExtractionCoordinator::new(Arc::new(extractor), workers);

    match coordinator.run(jobs).await {
        Ok(report) => {
            if report.summary.failed > 0 {
                warn!("{} slide(s) failed", report.summary.failed);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Extraction failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_patcher=debug"
    } else {
        "wsi_patcher=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
