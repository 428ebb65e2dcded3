//! Mosaic sampling through the extractor and coordinator.

use std::collections::BTreeSet;
use std::sync::Arc;

use wsi_patcher::extract::{MosaicStrategy, PerSlideExtractor, Strategy, MOSAIC_LABEL};
use wsi_patcher::filter::BackgroundFilter;
use wsi_patcher::slide::SlideEntry;
use wsi_patcher::ExtractionCoordinator;

use super::test_utils::*;

const SLIDE_PATH: &str = "/slides/VOA-7.tiff";
const PATCH_SIZE: u32 = 32;

fn mosaic(n_clusters: usize, percentage: f64) -> Strategy {
    Strategy::Mosaic(MosaicStrategy {
        stride: 0,
        evaluation_size: PATCH_SIZE / 4,
        n_clusters,
        percentage,
        radius: None,
        background: BackgroundFilter::default(),
    })
}

fn extractor(strategy: Strategy, slide: MockSlide) -> PerSlideExtractor {
    let opener = MockOpener::new().with_slide(SLIDE_PATH, slide);
    PerSlideExtractor::new(
        Arc::new(coords_only_plan(strategy, PATCH_SIZE)),
        Arc::new(opener),
    )
}

#[test]
fn test_every_colour_cluster_is_represented() {
    // 4 columns x 6 rows, three stains of 8 tiles each.
    let slide = banded_slide(4, 6, PATCH_SIZE);
    let coords = extractor(mosaic(3, 0.25), MockSlide::Image(slide))
        .extract(&SlideEntry::new(SLIDE_PATH, "VOA-7"))
        .unwrap()
        .unwrap();

    let selected = coords.coords(MOSAIC_LABEL);
    assert!(
        (3..=6).contains(&selected.len()),
        "selected {} tiles",
        selected.len()
    );

    let stains: BTreeSet<u32> = selected.iter().map(|&(_, y)| (y / PATCH_SIZE) % 3).collect();
    assert_eq!(stains, BTreeSet::from([0, 1, 2]));
    for &(x, y) in selected {
        assert_eq!(x % PATCH_SIZE, 0);
        assert!(x + PATCH_SIZE <= 4 * PATCH_SIZE && y + PATCH_SIZE <= 6 * PATCH_SIZE);
    }
}

#[test]
fn test_selection_is_deterministic() {
    let run = || {
        extractor(mosaic(3, 0.5), MockSlide::Image(banded_slide(4, 6, PATCH_SIZE)))
            .extract(&SlideEntry::new(SLIDE_PATH, "VOA-7"))
            .unwrap()
            .unwrap()
    };
    assert_eq!(run().coords(MOSAIC_LABEL), run().coords(MOSAIC_LABEL));
}

#[test]
fn test_fewer_tiles_than_clusters_produces_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let opener = MockOpener::new().with_slide(SLIDE_PATH, MockSlide::Image(tissue_slide(64, 32)));
    let plan = png_plan(mosaic(9, 0.05), dir.path(), PATCH_SIZE);

    let result = PerSlideExtractor::new(Arc::new(plan), Arc::new(opener))
        .extract(&SlideEntry::new(SLIDE_PATH, "VOA-7"))
        .unwrap();
    assert!(result.is_none());
    assert!(!dir.path().join(MOSAIC_LABEL).exists());
}

#[tokio::test]
async fn test_insufficient_slide_counts_as_empty() {
    let extractor = extractor(mosaic(9, 0.05), MockSlide::Image(tissue_slide(64, 32)));
    let report = ExtractionCoordinator::new(Arc::new(extractor), 1)
        .run(vec![SlideEntry::new(SLIDE_PATH, "VOA-7")])
        .await
        .unwrap();

    assert_eq!(report.summary.empty, 1);
    assert_eq!(report.summary.extracted, 0);
    assert!(report.metadata.is_empty());
}
