use image::imageops::{self, FilterType};
use image::RgbImage;

use super::kmeans::KMeans;

/// Histogram bins per colour channel.
pub const BINS_PER_CHANNEL: usize = 256;

/// Length of a colour histogram: red, green and blue bins concatenated.
pub const HISTOGRAM_LEN: usize = 3 * BINS_PER_CHANNEL;

/// Default number of colour clusters.
pub const DEFAULT_N_CLUSTERS: usize = 9;

/// Default fraction of each colour cluster kept as representatives.
pub const DEFAULT_PERCENTAGE: f64 = 0.05;

/// Resize `patch` to `evaluation_size` squared and count pixel values per
/// channel.
pub fn color_histogram(patch: &RgbImage, evaluation_size: u32) -> Vec<f32> {
    let evaluation_size = evaluation_size.max(1);
    let resized;
    let sample = if patch.dimensions() == (evaluation_size, evaluation_size) {
        patch
    } else {
        resized = imageops::resize(patch, evaluation_size, evaluation_size, FilterType::Lanczos3);
        &resized
    };

    let mut histogram = vec![0.0f32; HISTOGRAM_LEN];
    for pixel in sample.pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            histogram[channel * BINS_PER_CHANNEL + usize::from(value)] += 1.0;
        }
    }
    histogram
}

/// A tissue tile and its colour histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct TileHistogram {
    pub x: u32,
    pub y: u32,
    pub histogram: Vec<f32>,
}

/// Outcome of representative selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MosaicSelection {
    /// Fewer tissue tiles than colour clusters; nothing can be selected.
    Insufficient { tiles: usize, n_clusters: usize },

    /// Representative tile origins, grouped by colour cluster.
    Selected(Vec<(u32, u32)>),
}

impl MosaicSelection {
    pub fn coords(&self) -> &[(u32, u32)] {
        match self {
            Self::Insufficient { .. } => &[],
            Self::Selected(coords) => coords,
        }
    }
}

/// Two-stage k-means sampler: colour clusters first, then spatial clusters
/// within each colour cluster.
///
/// Each colour cluster of `k` tiles contributes `ceil(k * percentage)`
/// representatives, one per spatial centroid, each the member tile nearest
/// to that centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MosaicSelector {
    n_clusters: usize,
    percentage: f64,
    seed: u64,
}

impl MosaicSelector {
    pub fn new(n_clusters: usize, percentage: f64, seed: u64) -> Self {
        Self {
            n_clusters,
            percentage,
            seed,
        }
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Select representative tiles.
    pub fn select(&self, tiles: &[TileHistogram]) -> MosaicSelection {
        let histograms: Vec<Vec<f32>> = tiles.iter().map(|t| t.histogram.clone()).collect();
        let Some(colour) = KMeans::new(self.n_clusters)
            .with_seed(self.seed)
            .fit(&histograms)
        else {
            return MosaicSelection::Insufficient {
                tiles: tiles.len(),
                n_clusters: self.n_clusters,
            };
        };

        let mut selected = Vec::new();
        for cluster in 0..self.n_clusters {
            let members = colour.members(cluster);
            let k = members.len();
            if k == 0 {
                continue;
            }
            let target = (k as f64 * self.percentage).ceil() as usize;
            if target == 0 || target > k {
                continue;
            }

            let positions: Vec<Vec<f32>> = members
                .iter()
                .map(|&i| vec![tiles[i].x as f32, tiles[i].y as f32])
                .collect();
            let Some(spatial) = KMeans::new(target).with_seed(self.seed).fit(&positions) else {
                continue;
            };
            for local in spatial.nearest_members(&positions) {
                let tile = &tiles[members[local]];
                selected.push((tile.x, tile.y));
            }
        }
        MosaicSelection::Selected(selected)
    }
}
