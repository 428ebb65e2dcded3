//! Candidate tile generation.
//!
//! - [`TileGrid`]: sliding-window grid of tile origins, raster or seeded shuffle
//! - [`RadiusExpander`]: neighbours of an accepted tile within a radius
//! - [`corners`]: the four-corner containment rule used by labelling and masks

pub mod corners;
mod grid;
mod radius;

pub use grid::{TileGrid, TileIter, TilePosition};
pub use radius::{RadiusExpander, RadiusShape};
