//! Test utilities for integration tests.
//!
//! This module provides a mock slide opener backed by in-memory images and
//! helpers for building synthetic slides, annotation files and plans.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};

use wsi_patcher::error::SlideError;
use wsi_patcher::extract::{AnnotationStrategy, ExtractionPlan, Strategy, TilingStrategy};
use wsi_patcher::filter::BackgroundFilter;
use wsi_patcher::output::StorageMode;
use wsi_patcher::slide::{ImageSlide, SlideLayout, SlideOpener, SlideReader};

/// Stained tissue colour, well below the blank luminance.
pub const TISSUE: Rgb<u8> = Rgb([170, 70, 140]);

/// Glass background, above the blank luminance.
pub const BLANK: Rgb<u8> = Rgb([245, 245, 245]);

// =============================================================================
// Mock Slide Opener with Open Tracking
// =============================================================================

/// What the mock opener returns for a path.
pub enum MockSlide {
    Image(RgbImage),
    /// Opening fails with a [`SlideError`]
    Failing,
    /// Opening panics, killing the worker
    Panicking,
}

/// A slide opener serving in-memory images and counting open calls.
#[derive(Default)]
pub struct MockOpener {
    slides: HashMap<PathBuf, MockSlide>,
    opens: Arc<AtomicUsize>,
    tracking: Option<(Arc<SlideTracker>, Duration)>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slide(mut self, path: impl Into<PathBuf>, slide: MockSlide) -> Self {
        self.slides.insert(path.into(), slide);
        self
    }

    /// Shared counter of open calls, readable after the opener is moved.
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }

    /// Report image slides to `tracker` and hold each open for `hold`.
    pub fn with_tracker(mut self, tracker: Arc<SlideTracker>, hold: Duration) -> Self {
        self.tracking = Some((tracker, hold));
        self
    }
}

impl SlideOpener for MockOpener {
    fn open(&self, path: &Path, layout: SlideLayout) -> Result<Box<dyn SlideReader>, SlideError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let id = path.display().to_string();
        match self.slides.get(path) {
            Some(MockSlide::Image(image)) => {
                let slide = match layout {
                    SlideLayout::WholeSlide => ImageSlide::new(image.clone(), id),
                    SlideLayout::TmaCore { padding } => {
                        ImageSlide::padded(image.clone(), padding, id)
                    }
                };
                let Some((tracker, hold)) = &self.tracking else {
                    return Ok(Box::new(slide));
                };
                let name = path.file_stem().unwrap().to_string_lossy().into_owned();
                tracker.opened(&name);
                thread::sleep(*hold);
                Ok(Box::new(TrackedSlide {
                    inner: slide,
                    name,
                    tracker: Arc::clone(tracker),
                }))
            }
            Some(MockSlide::Panicking) => panic!("mock reader crashed on {id}"),
            Some(MockSlide::Failing) | None => Err(SlideError::Open {
                path: path.to_path_buf(),
                message: "mock slide unavailable".to_string(),
            }),
        }
    }
}

// =============================================================================
// Slide Lifetime Tracking
// =============================================================================

/// A slide being opened or its reader being dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideEvent {
    Opened(String),
    Released(String),
}

/// Records slide lifetimes across workers and the peak number open at once.
#[derive(Default)]
pub struct SlideTracker {
    open_now: AtomicUsize,
    peak: AtomicUsize,
    events: Mutex<Vec<SlideEvent>>,
}

impl SlideTracker {
    fn opened(&self, name: &str) {
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(SlideEvent::Opened(name.to_string()));
    }

    fn released(&self, name: &str) {
        self.open_now.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(SlideEvent::Released(name.to_string()));
    }

    /// Largest number of slides that were open at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<SlideEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Image slide that reports its release when the worker drops it.
struct TrackedSlide {
    inner: ImageSlide,
    name: String,
    tracker: Arc<SlideTracker>,
}

impl SlideReader for TrackedSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn read_region(&self, x: u32, y: u32, size: u32) -> Result<RgbImage, SlideError> {
        self.inner.read_region(x, y, size)
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

impl Drop for TrackedSlide {
    fn drop(&mut self) {
        self.tracker.released(&self.name);
    }
}

// =============================================================================
// Synthetic Slides
// =============================================================================

/// Uniform tissue slide.
pub fn tissue_slide(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, TISSUE)
}

/// Tissue left of `tissue_width`, blank background to the right.
pub fn half_tissue_slide(width: u32, height: u32, tissue_width: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| if x < tissue_width { TISSUE } else { BLANK })
}

/// Slide of `patch_size` blocks whose colour depends on the block's row.
///
/// Rows cycle through three distinct stains so colour clustering has three
/// well separated groups.
pub fn banded_slide(columns: u32, rows: u32, patch_size: u32) -> RgbImage {
    const STAINS: [Rgb<u8>; 3] = [Rgb([200, 40, 40]), Rgb([40, 160, 40]), Rgb([40, 40, 200])];
    RgbImage::from_fn(columns * patch_size, rows * patch_size, |_, y| {
        STAINS[((y / patch_size) % 3) as usize]
    })
}

// =============================================================================
// Fixtures
// =============================================================================

/// Write `text` to `<dir>/<name>.txt` and return the path.
pub fn write_annotation(dir: &Path, name: &str, text: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{name}.txt"));
    fs::write(&path, text).unwrap();
    path
}

/// One annotation line for an axis-aligned rectangle.
pub fn rectangle_line(label: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> String {
    format!(
        "{label} [Point: {x0}, {y0}, Point: {x1}, {y0}, Point: {x1}, {y1}, Point: {x0}, {y1}]\n"
    )
}

// =============================================================================
// Plans
// =============================================================================

pub fn annotation_strategy(annotation_overlap: f64) -> AnnotationStrategy {
    AnnotationStrategy {
        annotation_overlap,
        patch_overlap: 0.0,
        stride: 0,
        tumor_only: false,
        tma_margin: None,
        radius: None,
        background: BackgroundFilter::for_annotation_overlap(annotation_overlap),
    }
}

pub fn entire_slide_strategy() -> Strategy {
    Strategy::EntireSlide(TilingStrategy {
        stride: 0,
        radius: None,
        background: BackgroundFilter::default(),
    })
}

/// Plan writing PNG files below `root`.
pub fn png_plan(strategy: Strategy, root: &Path, patch_size: u32) -> ExtractionPlan {
    ExtractionPlan::new(strategy, root)
        .with_patch_size(patch_size)
        .with_storage(StorageMode::Png)
}

/// Plan recording coordinates only.
pub fn coords_only_plan(strategy: Strategy, patch_size: u32) -> ExtractionPlan {
    ExtractionPlan::new(strategy, "/unused")
        .with_patch_size(patch_size)
        .with_storage(StorageMode::None)
}
