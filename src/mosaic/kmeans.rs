//! Seeded k-means clustering.
//!
//! k-means++ initialisation followed by Lloyd iterations until the assignment
//! of every point is stable. All randomness comes from a `StdRng` seeded by
//! the caller, so a fit is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Upper bound on Lloyd iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// k-means settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeans {
    k: usize,
    seed: u64,
    max_iterations: usize,
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub centroids: Vec<Vec<f32>>,

    /// Cluster index of every input point
    pub assignments: Vec<usize>,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Cluster `data` into `k` groups.
    ///
    /// Returns `None` when `k` is zero or exceeds the number of points.
    pub fn fit(&self, data: &[Vec<f32>]) -> Option<KMeansFit> {
        if self.k == 0 || data.len() < self.k {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = initialize_centroids(data, self.k, &mut rng);
        let mut assignments = assign(data, &centroids);

        for _ in 0..self.max_iterations {
            update_centroids(data, &assignments, &mut centroids);
            let next = assign(data, &centroids);
            if next == assignments {
                break;
            }
            assignments = next;
        }

        Some(KMeansFit {
            centroids,
            assignments,
        })
    }
}

impl KMeansFit {
    /// Indices of the points assigned to `cluster`.
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == cluster)
            .map(|(i, _)| i)
            .collect()
    }

    /// For every centroid, the index of the closest point in `data`.
    ///
    /// Ties go to the lowest index.
    pub fn nearest_members(&self, data: &[Vec<f32>]) -> Vec<usize> {
        self.centroids
            .iter()
            .filter_map(|centroid| nearest(data, centroid))
            .collect()
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the item in `items` closest to `point`, lowest index on ties.
fn nearest(items: &[Vec<f32>], point: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, item) in items.iter().enumerate() {
        let d = squared_distance(item, point);
        if best.map_or(true, |(_, bd)| d.total_cmp(&bd).is_lt()) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

fn assign(data: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<usize> {
    data.iter()
        .map(|point| nearest(centroids, point).unwrap_or(0))
        .collect()
}

/// k-means++ seeding: each further centroid is drawn with probability
/// proportional to its squared distance from the closest chosen one.
fn initialize_centroids(data: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..data.len())].clone());

    while centroids.len() < k {
        let distances: Vec<f32> = data
            .iter()
            .map(|point| {
                centroids
                    .iter()
                    .map(|c| squared_distance(point, c))
                    .fold(f32::INFINITY, f32::min)
            })
            .collect();

        let total: f32 = distances.iter().sum();
        let chosen = if total > 0.0 {
            let threshold = rng.random::<f32>() * total;
            let mut cumulative = 0.0;
            distances
                .iter()
                .position(|&d| {
                    cumulative += d;
                    d > 0.0 && cumulative >= threshold
                })
                .or_else(|| distances.iter().rposition(|&d| d > 0.0))
                .unwrap_or(0)
        } else {
            rng.random_range(0..data.len())
        };
        centroids.push(data[chosen].clone());
    }

    centroids
}

/// Move each centroid to the mean of its members.
///
/// An empty cluster is reseeded at the point farthest from its own centroid.
fn update_centroids(data: &[Vec<f32>], assignments: &[usize], centroids: &mut [Vec<f32>]) {
    let dim = centroids.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (point, &cluster) in data.iter().zip(assignments) {
        for (sum, &value) in sums[cluster].iter_mut().zip(point) {
            *sum += value;
        }
        counts[cluster] += 1;
    }

    for (cluster, (sum, &count)) in sums.into_iter().zip(&counts).enumerate() {
        if count > 0 {
            centroids[cluster] = sum.into_iter().map(|s| s / count as f32).collect();
        }
    }

    for cluster in (0..centroids.len()).filter(|&c| counts[c] == 0) {
        let farthest = data
            .iter()
            .zip(assignments)
            .map(|(point, &c)| squared_distance(point, &centroids[c]))
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);
        if let Some(i) = farthest {
            centroids[cluster] = data[i].clone();
        }
    }
}
