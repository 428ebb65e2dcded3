//! Batched extraction across many slides.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use wsi_patcher::error::ExtractError;
use wsi_patcher::extract::{PerSlideExtractor, ReplayStrategy, Strategy, ENTIRE_SLIDE_LABEL};
use wsi_patcher::output::StorageMode;
use wsi_patcher::slide::SlideEntry;
use wsi_patcher::{ExtractionCoordinator, ExtractionPlan, SlideCoordsMetadata};

use super::test_utils::*;

fn slide_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/slides/POLE/{name}.tiff"))
}

fn job(name: &str) -> SlideEntry {
    SlideEntry::new(slide_path(name), format!("POLE/{name}"))
}

fn coordinator(plan: ExtractionPlan, opener: MockOpener, workers: usize) -> ExtractionCoordinator {
    let extractor = PerSlideExtractor::new(Arc::new(plan), Arc::new(opener));
    ExtractionCoordinator::new(Arc::new(extractor), workers)
}

#[tokio::test]
async fn test_failures_do_not_abort_the_run() {
    let opener = MockOpener::new()
        .with_slide(slide_path("VOA-1"), MockSlide::Image(tissue_slide(128, 128)))
        .with_slide(slide_path("VOA-2"), MockSlide::Failing)
        .with_slide(slide_path("VOA-3"), MockSlide::Panicking)
        .with_slide(slide_path("VOA-4"), MockSlide::Image(tissue_slide(64, 128)))
        .with_slide(slide_path("VOA-5"), MockSlide::Image(tissue_slide(128, 64)));
    let opens = opener.open_counter();
    let plan = coords_only_plan(entire_slide_strategy(), 64);

    let jobs = ["VOA-1", "VOA-2", "VOA-3", "VOA-4", "VOA-5"].map(job).to_vec();
    let report = coordinator(plan, opener, 2).run(jobs).await.unwrap();

    assert_eq!(opens.load(Ordering::SeqCst), 5);
    assert_eq!(report.summary.extracted, 3);
    assert_eq!(report.summary.failed, 2);
    assert_eq!(report.summary.empty, 0);

    let names: Vec<_> = report.metadata.slide_names().collect();
    assert_eq!(names, vec!["VOA-1", "VOA-4", "VOA-5"]);
    assert_eq!(report.metadata.get_slide("VOA-1").unwrap().len(), 4);
    assert_eq!(report.metadata.get_slide("VOA-4").unwrap().len(), 2);

    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].0, "VOA-2");
    assert!(matches!(report.failures[0].1, ExtractError::Slide(_)));
    assert_eq!(report.failures[1].0, "VOA-3");
    assert!(matches!(
        report.failures[1].1,
        ExtractError::WorkerAborted { .. }
    ));
}

#[tokio::test]
async fn test_batches_run_one_after_another() {
    const NAMES: [&str; 5] = ["VOA-1", "VOA-2", "VOA-3", "VOA-4", "VOA-5"];
    let tracker = Arc::new(SlideTracker::default());

    let mut opener =
        MockOpener::new().with_tracker(Arc::clone(&tracker), Duration::from_millis(50));
    for name in NAMES {
        opener = opener.with_slide(slide_path(name), MockSlide::Image(tissue_slide(64, 64)));
    }
    let plan = coords_only_plan(entire_slide_strategy(), 32);

    let report = coordinator(plan, opener, 2)
        .run(NAMES.map(job).to_vec())
        .await
        .unwrap();
    assert_eq!(report.summary.extracted, 5);

    assert!(
        (1..=2).contains(&tracker.peak()),
        "{} slides open at once",
        tracker.peak()
    );

    let events = tracker.events();
    assert_eq!(events.len(), 2 * NAMES.len());
    let position = |event: SlideEvent| events.iter().position(|e| *e == event).unwrap();

    // Every slide of a batch is released before any slide of a later batch opens.
    let batches: Vec<&[&str]> = NAMES.chunks(2).collect();
    for (i, batch) in batches.iter().enumerate() {
        for later in &batches[i + 1..] {
            for done in batch.iter() {
                for next in later.iter() {
                    assert!(
                        position(SlideEvent::Released(done.to_string()))
                            < position(SlideEvent::Opened(next.to_string())),
                        "{next} opened before {done} was released"
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn test_results_persisted_once_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    let coords_path = dir.path().join("meta/coords.json");

    let mut opener = MockOpener::new();
    let mut jobs = Vec::new();
    // Reverse order so completion order differs from name order.
    for name in ["VOA-9", "VOA-5", "VOA-1"] {
        opener = opener.with_slide(slide_path(name), MockSlide::Image(tissue_slide(64, 64)));
        jobs.push(job(name));
    }
    let plan = coords_only_plan(entire_slide_strategy(), 32)
        .with_resize_sizes(vec![32, 16])
        .with_coords_location(Some(coords_path.clone()));

    let report = coordinator(plan, opener, 8).run(jobs).await.unwrap();
    assert_eq!(report.summary.extracted, 3);

    let text = fs::read_to_string(&coords_path).unwrap();
    let first = text.find("VOA-1").unwrap();
    let second = text.find("VOA-5").unwrap();
    let third = text.find("VOA-9").unwrap();
    assert!(first < second && second < third);

    let loaded = SlideCoordsMetadata::load(&coords_path).unwrap();
    assert_eq!(loaded.patch_size(), 32);
    assert_eq!(loaded.resize_sizes(), &[32, 16]);
    assert_eq!(
        loaded.get_slide("VOA-5").unwrap().coords(ENTIRE_SLIDE_LABEL),
        &[(0, 0), (32, 0), (0, 32), (32, 32)]
    );
}

#[tokio::test]
async fn test_replay_rewrites_stored_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let coords_path = dir.path().join("coords.json");
    let annotation = write_annotation(
        &dir.path().join("annotations"),
        "VOA-1",
        &(rectangle_line("Tumor", 0.0, 0.0, 128.0, 64.0)
            + &rectangle_line("Stroma", 0.0, 64.0, 128.0, 128.0)),
    );
    let slide = || MockSlide::Image(tissue_slide(128, 128));

    // First pass: annotation strategy, coordinates only.
    let plan = coords_only_plan(Strategy::Annotation(annotation_strategy(1.0)), 64)
        .with_coords_location(Some(coords_path.clone()));
    let opener = MockOpener::new().with_slide(slide_path("VOA-1"), slide());
    coordinator(plan, opener, 1)
        .run(vec![job("VOA-1").with_annotation(&annotation)])
        .await
        .unwrap();

    // Second pass: replay Tumor tiles into PNG files.
    let stored = SlideCoordsMetadata::load(&coords_path).unwrap();
    let root = dir.path().join("patches");
    let plan = ExtractionPlan::new(
        Strategy::SlideCoords(ReplayStrategy {
            coords: stored,
            tumor_only: true,
        }),
        &root,
    )
    .with_patch_size(64)
    .with_storage(StorageMode::Png);
    let opener = MockOpener::new().with_slide(slide_path("VOA-1"), slide());
    let report = coordinator(plan, opener, 1)
        .run(vec![job("VOA-1")])
        .await
        .unwrap();

    let replayed = report.metadata.get_slide("VOA-1").unwrap();
    assert_eq!(replayed.coords("Tumor"), &[(0, 0), (64, 0)]);
    assert!(replayed.coords("Stroma").is_empty());
    assert!(root.join("Tumor/POLE/VOA-1/64/40/64_0.png").exists());
    assert!(!root.join("Stroma").exists());
}

#[tokio::test]
async fn test_archive_storage_writes_one_container_per_slide() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("patches");

    let opener = MockOpener::new()
        .with_slide(slide_path("VOA-1"), MockSlide::Image(tissue_slide(64, 32)))
        .with_slide(slide_path("VOA-2"), MockSlide::Image(tissue_slide(32, 32)));
    let plan = ExtractionPlan::new(entire_slide_strategy(), &root)
        .with_patch_size(32)
        .with_storage(StorageMode::Archive);

    let report = coordinator(plan, opener, 2)
        .run(vec![job("VOA-1"), job("VOA-2")])
        .await
        .unwrap();
    assert_eq!(report.summary.extracted, 2);

    let file = fs::File::open(root.join("VOA-1.tar")).unwrap();
    let mut archive = tar::Archive::new(file);
    let mut names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().display().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "Mix/POLE/VOA-1/32/40/0_0.png.gz",
            "Mix/POLE/VOA-1/32/40/32_0.png.gz",
        ]
    );
    assert!(root.join("VOA-2.tar").exists());
}
