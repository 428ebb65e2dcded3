//! Annotation-guided and entire-slide extraction on synthetic slides.

use std::sync::Arc;

use image::{GrayImage, Luma};

use wsi_patcher::extract::{PerSlideExtractor, RadiusSpec, Strategy, TilingStrategy, ENTIRE_SLIDE_LABEL};
use wsi_patcher::filter::BackgroundFilter;
use wsi_patcher::output::{label_colour, StorageMode, THUMBNAIL_DIR, THUMBNAIL_MAX_SIDE};
use wsi_patcher::slide::SlideEntry;
use wsi_patcher::tiling::RadiusShape;
use wsi_patcher::{CoordsMetadata, ExtractionPlan};

use super::test_utils::*;

const SLIDE_PATH: &str = "/slides/POLE/VOA-1.tiff";

fn extract(plan: ExtractionPlan, slide: MockSlide, entry: &SlideEntry) -> CoordsMetadata {
    let opener = MockOpener::new().with_slide(SLIDE_PATH, slide);
    PerSlideExtractor::new(Arc::new(plan), Arc::new(opener))
        .extract(entry)
        .unwrap()
        .unwrap()
}

fn entry() -> SlideEntry {
    SlideEntry::new(SLIDE_PATH, "POLE/VOA-1")
}

// =============================================================================
// Annotation Strategy
// =============================================================================

#[test]
fn test_top_left_quadrant_yields_four_tumor_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let annotation = write_annotation(
        &dir.path().join("annotations"),
        "VOA-1",
        &rectangle_line("Tumor", 0.0, 0.0, 2048.0, 2048.0),
    );
    let root = dir.path().join("patches");
    let plan = png_plan(Strategy::Annotation(annotation_strategy(1.0)), &root, 1024)
        .with_resize_sizes(vec![256]);

    let coords = extract(
        plan,
        MockSlide::Image(tissue_slide(4096, 4096)),
        &entry().with_annotation(&annotation),
    );

    assert_eq!(
        coords.coords("Tumor"),
        &[(0, 0), (1024, 0), (0, 1024), (1024, 1024)]
    );
    assert_eq!(coords.labels().collect::<Vec<_>>(), vec!["Tumor"]);

    // 256 px out of 1024 px at 40x is 10x.
    for (x, y) in [(0, 0), (1024, 0), (0, 1024), (1024, 1024)] {
        let path = root.join(format!("Tumor/POLE/VOA-1/256/10/{x}_{y}.png"));
        let patch = image::open(&path).unwrap().to_rgb8();
        assert_eq!(patch.dimensions(), (256, 256));
    }
    assert!(!root.join("Tumor/POLE/VOA-1/256/10/2048_0.png").exists());
    assert!(!root.join(THUMBNAIL_DIR).exists());
}

#[test]
fn test_thumbnail_overlays_accepted_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let annotation = write_annotation(
        &dir.path().join("annotations"),
        "VOA-1",
        &rectangle_line("Tumor", 0.0, 0.0, 2048.0, 2048.0),
    );
    let root = dir.path().join("patches");
    let plan = ExtractionPlan::new(Strategy::Annotation(annotation_strategy(1.0)), &root)
        .with_patch_size(1024)
        .with_storage(StorageMode::None)
        .with_thumbnail(true);

    extract(
        plan,
        MockSlide::Image(tissue_slide(4096, 4096)),
        &entry().with_annotation(&annotation),
    );

    // The thumbnail is a quarter of the slide, so tiles are 256 px squares.
    let thumbnail = image::open(root.join(THUMBNAIL_DIR).join("VOA-1.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(thumbnail.dimensions(), (THUMBNAIL_MAX_SIDE, THUMBNAIL_MAX_SIDE));
    let tumor = label_colour("Tumor");
    assert_eq!(thumbnail.get_pixel(0, 0), &tumor);
    assert_eq!(thumbnail.get_pixel(255, 100), &tumor);
    assert_eq!(thumbnail.get_pixel(100, 511), &tumor);
    assert_eq!(thumbnail.get_pixel(100, 100), &TISSUE);
    assert_eq!(thumbnail.get_pixel(800, 800), &TISSUE);
    assert!(!root.join("Tumor").exists());
}

#[test]
fn test_boundary_tiles_take_both_labels() {
    let dir = tempfile::tempdir().unwrap();
    let text = rectangle_line("Tumor", 0.0, 0.0, 1024.0, 1024.0)
        + &rectangle_line("Stroma", 1024.0, 0.0, 2048.0, 1024.0);
    let annotation = write_annotation(dir.path(), "VOA-1", &text);

    let mut strategy = annotation_strategy(0.5);
    strategy.patch_overlap = 0.5;
    let plan = coords_only_plan(Strategy::Annotation(strategy), 1024);

    let coords = extract(
        plan,
        MockSlide::Image(tissue_slide(2048, 1024)),
        &entry().with_annotation(&annotation),
    );

    assert_eq!(coords.coords("Tumor"), &[(0, 0), (512, 0)]);
    assert_eq!(coords.coords("Stroma"), &[(512, 0), (1024, 0)]);
}

#[test]
fn test_tumor_only_drops_other_labels() {
    let dir = tempfile::tempdir().unwrap();
    let text = rectangle_line("Stroma", 0.0, 0.0, 1024.0, 1024.0)
        + &rectangle_line("Tumor", 1024.0, 0.0, 2048.0, 1024.0);
    let annotation = write_annotation(dir.path(), "VOA-1", &text);

    let mut strategy = annotation_strategy(1.0);
    strategy.tumor_only = true;
    let plan = coords_only_plan(Strategy::Annotation(strategy), 1024);

    let coords = extract(
        plan,
        MockSlide::Image(tissue_slide(2048, 1024)),
        &entry().with_annotation(&annotation),
    );
    assert_eq!(coords.labels().collect::<Vec<_>>(), vec!["Tumor"]);
    assert_eq!(coords.coords("Tumor"), &[(1024, 0)]);
}

#[test]
fn test_blank_tiles_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let annotation = write_annotation(
        dir.path(),
        "VOA-1",
        &rectangle_line("Tumor", 0.0, 0.0, 4096.0, 1024.0),
    );
    let plan = coords_only_plan(Strategy::Annotation(annotation_strategy(1.0)), 1024);

    let coords = extract(
        plan,
        MockSlide::Image(half_tissue_slide(4096, 1024, 2048)),
        &entry().with_annotation(&annotation),
    );
    assert_eq!(coords.coords("Tumor"), &[(0, 0), (1024, 0)]);
}

#[test]
fn test_accepted_tiles_lie_inside_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let annotation = write_annotation(
        dir.path(),
        "VOA-1",
        "Tumor [Point: 100, 100, Point: 900, 150, Point: 700, 950]\n",
    );
    let plan = coords_only_plan(Strategy::Annotation(annotation_strategy(1.0)), 64);

    let coords = extract(
        plan,
        MockSlide::Image(tissue_slide(1024, 1024)),
        &entry().with_annotation(&annotation),
    );

    let regions = wsi_patcher::annotation::load_annotations(&annotation).unwrap();
    let index = wsi_patcher::AnnotationIndex::new(regions, 1.0);
    assert!(!coords.is_empty());
    for &(x, y) in coords.coords("Tumor") {
        assert!(x + 64 <= 1024 && y + 64 <= 1024);
        assert!(index.contains(x, y, 64), "({x}, {y}) outside polygon");
    }
}

// =============================================================================
// Tissue Mask
// =============================================================================

#[test]
fn test_raster_mask_limits_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let mask_path = dir.path().join("VOA-1.png");
    // 4x4 mask over a 256x256 slide: left half is tissue.
    GrayImage::from_fn(4, 4, |x, _| if x < 2 { Luma([255]) } else { Luma([0]) })
        .save(&mask_path)
        .unwrap();

    let plan = coords_only_plan(entire_slide_strategy(), 64);
    let coords = extract(
        plan,
        MockSlide::Image(tissue_slide(256, 256)),
        &entry().with_mask(&mask_path),
    );

    let mix = coords.coords(ENTIRE_SLIDE_LABEL);
    assert_eq!(mix.len(), 8);
    assert!(mix.iter().all(|&(x, _)| x < 128));
}

// =============================================================================
// Entire Slide
// =============================================================================

#[test]
fn test_radius_expansion_order() {
    let strategy = Strategy::EntireSlide(TilingStrategy {
        stride: 0,
        radius: Some(RadiusSpec {
            radius: 1,
            shape: RadiusShape::Square,
        }),
        background: BackgroundFilter::default(),
    });
    let plan = coords_only_plan(strategy, 64);

    let coords = extract(plan, MockSlide::Image(tissue_slide(192, 192)), &entry());
    assert_eq!(
        coords.coords(ENTIRE_SLIDE_LABEL),
        &[
            (0, 0),
            (64, 0),
            (0, 64),
            (64, 64),
            (128, 0),
            (128, 64),
            (0, 128),
            (64, 128),
            (128, 128),
        ]
    );
}

#[test]
fn test_cap_is_deterministic_for_a_seed() {
    let run = |seed| {
        let plan = coords_only_plan(entire_slide_strategy(), 32)
            .with_max_slide_patches(Some(10))
            .with_seed(seed);
        extract(plan, MockSlide::Image(tissue_slide(256, 256)), &entry())
    };

    let first = run(7);
    let second = run(7);
    assert_eq!(first.coords(ENTIRE_SLIDE_LABEL), second.coords(ENTIRE_SLIDE_LABEL));
    assert_eq!(first.len(), 10);

    let mut unique = first.coords(ENTIRE_SLIDE_LABEL).to_vec();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 10);
}

#[test]
fn test_tma_core_is_padded() {
    let dir = tempfile::tempdir().unwrap();
    let annotation = write_annotation(
        dir.path(),
        "VOA-1",
        &rectangle_line("Tumor", 0.0, 0.0, 128.0, 128.0),
    );
    let mut strategy = annotation_strategy(1.0);
    strategy.tma_margin = Some(1.0);
    let plan = coords_only_plan(Strategy::Annotation(strategy), 64);

    // 64 px of edge padding on each side turns a 128 px core into 256 px.
    let coords = extract(
        plan,
        MockSlide::Image(tissue_slide(128, 128)),
        &entry().with_annotation(&annotation),
    );
    assert_eq!(
        coords.coords("Tumor"),
        &[(64, 64), (128, 64), (64, 128), (128, 128)]
    );
}
