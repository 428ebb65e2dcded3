//! Slide abstraction layer.
//!
//! This module provides a unified interface for reading square regions from
//! Whole Slide Images regardless of their underlying format, plus slide
//! discovery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           PerSlideExtractor             │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             RegionCache                 │
//! │   (per-worker LRU of decoded regions)   │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │  (format-agnostic region interface)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │   ImageSlide    │    │  external readers   │
//! │ (flat images,   │    │  (pyramidal, via    │
//! │  TMA cores)     │    │   SlideOpener)      │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod cache;
pub mod catalog;
mod reader;

pub use cache::{RegionCache, DEFAULT_REGION_CACHE_CAPACITY};
pub use catalog::{CatalogConfig, SlideEntry, SlideSource};
pub use reader::{edge_pad, ImageFileOpener, ImageSlide, SlideLayout, SlideOpener, SlideReader};
