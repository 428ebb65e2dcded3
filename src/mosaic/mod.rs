//! Representative sampling for the mosaic strategy.
//!
//! ```text
//! tissue tiles ──► colour histograms ──► k-means (n_clusters)
//!                                              │
//!                      per colour cluster ◄────┘
//!                              │
//!                              ▼
//!               k-means on (x, y), ceil(k * percentage) centroids
//!                              │
//!                              ▼
//!                  member nearest each centroid
//! ```

mod kmeans;
mod selector;

pub use kmeans::{KMeans, KMeansFit, DEFAULT_MAX_ITERATIONS};
pub use selector::{
    color_histogram, MosaicSelection, MosaicSelector, TileHistogram, BINS_PER_CHANNEL,
    DEFAULT_N_CLUSTERS, DEFAULT_PERCENTAGE, HISTOGRAM_LEN,
};
