//! Batch execution of slide jobs.
//!
//! The coordinator splits the job list into batches of at most `workers`
//! slides. Every slide of a batch is extracted on its own blocking task and
//! reports back over a one-shot channel; the next batch starts only once
//! every task of the current one has finished.
//!
//! ```text
//!            ┌──────────── batch 1 ────────────┐
//! jobs ──►   │ spawn_blocking ── oneshot ──┐   │
//!            │ spawn_blocking ── oneshot ──┼─► merge ──► ... ──► save once
//!            │ spawn_blocking ── oneshot ──┘   │
//!            └─────────────────────────────────┘
//! ```
//!
//! A worker that panics drops its sender without sending. The coordinator
//! sees the closed channel and records the slide as failed.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{CoordinatorError, ExtractError};
use crate::extract::PerSlideExtractor;
use crate::metadata::{CoordsMetadata, SlideCoordsMetadata};
use crate::slide::SlideEntry;

/// Upper bound on concurrently running slide workers.
pub const MAX_WORKERS: usize = 200;

/// Worker count actually used for a run.
///
/// `requested` defaults to the number of available CPUs and is clamped to
/// `[1, min(available, MAX_WORKERS)]`.
pub fn effective_workers(requested: Option<usize>, available: usize) -> usize {
    let ceiling = available.clamp(1, MAX_WORKERS);
    requested.unwrap_or(ceiling).clamp(1, ceiling)
}

type SlideResult = Result<Option<CoordsMetadata>, ExtractError>;

/// Per-run slide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Slides that returned coordinates (possibly none)
    pub extracted: usize,
    /// Slides for which the strategy produced nothing
    pub empty: usize,
    /// Slides whose worker returned an error or aborted
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.extracted + self.empty + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slides: {} extracted, {} empty, {} failed",
            self.total(),
            self.extracted,
            self.empty,
            self.failed
        )
    }
}

/// Outcome of a whole run.
#[derive(Debug)]
pub struct RunReport {
    /// Merged coordinates of every slide that returned some
    pub metadata: SlideCoordsMetadata,
    pub summary: RunSummary,
    /// Slide name and error of every failed slide, in job order
    pub failures: Vec<(String, ExtractError)>,
}

/// Runs a [`PerSlideExtractor`] over many slides in bounded batches.
pub struct ExtractionCoordinator {
    extractor: Arc<PerSlideExtractor>,
    workers: usize,
}

impl ExtractionCoordinator {
    pub fn new(extractor: Arc<PerSlideExtractor>, workers: usize) -> Self {
        Self {
            extractor,
            workers: workers.clamp(1, MAX_WORKERS),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Extract every job, merge the results and persist them once.
    ///
    /// Failing slides are logged and reported in the [`RunReport`]; they never
    /// abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the merged coordinates cannot be saved.
    pub async fn run(&self, jobs: Vec<SlideEntry>) -> Result<RunReport, CoordinatorError> {
        let plan = self.extractor.plan();
        let mut report = RunReport {
            metadata: SlideCoordsMetadata::new(plan.patch_size, plan.resize_sizes.clone()),
            summary: RunSummary::default(),
            failures: Vec::new(),
        };

        let batches = jobs.len().div_ceil(self.workers);
        for (batch, chunk) in jobs.chunks(self.workers).enumerate() {
            info!(
                batch = batch + 1,
                batches,
                slides = chunk.len(),
                "Starting batch"
            );
            for (entry, result) in chunk.iter().zip(self.run_batch(chunk).await) {
                self.record(&mut report, entry, result);
            }
        }

        if let Some(path) = &plan.coords_location {
            report.metadata.save(path)?;
            info!(
                path = %path.display(),
                slides = report.metadata.len(),
                "Saved slide coordinates"
            );
        }
        info!(summary = %report.summary, "Extraction finished");
        Ok(report)
    }

    /// Run one batch and return the results in job order.
    async fn run_batch(&self, chunk: &[SlideEntry]) -> Vec<SlideResult> {
        let mut receivers = Vec::with_capacity(chunk.len());
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(chunk.len());

        for entry in chunk {
            let (tx, rx) = oneshot::channel::<SlideResult>();
            let extractor = Arc::clone(&self.extractor);
            let entry = entry.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let result = extractor.extract(&entry);
                // The receiver only goes away if the run itself was dropped.
                let _ = tx.send(result);
            }));
            receivers.push(rx);
        }

        let mut results = Vec::with_capacity(chunk.len());
        for (entry, rx) in chunk.iter().zip(receivers) {
            results.push(rx.await.unwrap_or_else(|_| {
                Err(ExtractError::WorkerAborted {
                    slide: entry.name.clone(),
                })
            }));
        }

        for (entry, handle) in chunk.iter().zip(handles) {
            if let Err(e) = handle.await {
                debug!(slide = %entry.name, error = %e, "Worker task did not complete");
            }
        }
        results
    }

    fn record(&self, report: &mut RunReport, entry: &SlideEntry, result: SlideResult) {
        match result {
            Ok(Some(coords)) => {
                report.summary.extracted += 1;
                report.metadata.merge(coords);
            }
            Ok(None) => {
                report.summary.empty += 1;
            }
            Err(e) => {
                error!(slide = %entry.name, error = %e, "Slide extraction failed");
                report.summary.failed += 1;
                report.failures.push((entry.name.clone(), e));
            }
        }
    }
}
