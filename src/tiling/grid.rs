use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One candidate tile on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePosition {
    /// Grid column
    pub tile_x: u32,
    /// Grid row
    pub tile_y: u32,
    /// Pixel X of the top-left corner
    pub x: u32,
    /// Pixel Y of the top-left corner
    pub y: u32,
}

/// Sliding-window grid of candidate tile origins over a slide.
///
/// The grid is a description, not a cursor: [`TileGrid::iter`] can be called
/// any number of times and yields the same sequence each time.
///
/// # Example
///
/// ```
/// use wsi_patcher::tiling::TileGrid;
///
/// let grid = TileGrid::new(4096, 4096, 1024);
/// assert_eq!(grid.len(), 16);
///
/// let first = grid.iter().next().unwrap();
/// assert_eq!((first.x, first.y), (0, 0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    patch_size: u32,
    patch_overlap: f64,
    stride: u32,
    shuffle_seed: Option<u64>,
}

impl TileGrid {
    /// Create a non-overlapping raster grid.
    pub fn new(width: u32, height: u32, patch_size: u32) -> Self {
        Self {
            width,
            height,
            patch_size,
            patch_overlap: 0.0,
            stride: 0,
            shuffle_seed: None,
        }
    }

    /// Set the fraction of `patch_size` shared by adjacent tiles, in `[0, 1)`.
    pub fn with_overlap(mut self, patch_overlap: f64) -> Self {
        self.patch_overlap = patch_overlap.clamp(0.0, 1.0);
        self
    }

    /// Add `stride` pixels to the step between adjacent tiles.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Emit tiles in a seeded random permutation instead of raster order.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Distance in pixels between adjacent tile origins.
    pub fn step(&self) -> u32 {
        let base = (f64::from(self.patch_size) * (1.0 - self.patch_overlap)).round() as u32;
        base.saturating_add(self.stride).max(1)
    }

    /// Number of grid columns.
    pub fn columns(&self) -> u32 {
        span(self.width, self.patch_size, self.step())
    }

    /// Number of grid rows.
    pub fn rows(&self) -> u32 {
        span(self.height, self.patch_size, self.step())
    }

    /// Total number of tiles.
    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    /// Iterate over the grid from the start.
    pub fn iter(&self) -> TileIter {
        let order = self.shuffle_seed.map(|seed| {
            let mut order: Vec<usize> = (0..self.len()).collect();
            order.shuffle(&mut StdRng::seed_from_u64(seed));
            order
        });

        TileIter {
            columns: self.columns(),
            step: self.step(),
            len: self.len(),
            order,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a TileGrid {
    type Item = TilePosition;
    type IntoIter = TileIter;

    fn into_iter(self) -> TileIter {
        self.iter()
    }
}

/// Number of full tiles of `patch_size` that fit in `extent` at `step`.
fn span(extent: u32, patch_size: u32, step: u32) -> u32 {
    if patch_size == 0 || extent < patch_size {
        0
    } else {
        (extent - patch_size) / step + 1
    }
}

/// Iterator over a [`TileGrid`].
#[derive(Debug, Clone)]
pub struct TileIter {
    columns: u32,
    step: u32,
    len: usize,
    /// Permutation of raster indices when shuffling
    order: Option<Vec<usize>>,
    next: usize,
}

impl Iterator for TileIter {
    type Item = TilePosition;

    fn next(&mut self) -> Option<TilePosition> {
        if self.next >= self.len {
            return None;
        }
        let raster = match &self.order {
            Some(order) => order[self.next],
            None => self.next,
        };
        self.next += 1;

        let columns = self.columns as usize;
        let tile_x = (raster % columns) as u32;
        let tile_y = (raster / columns) as u32;
        Some(TilePosition {
            tile_x,
            tile_y,
            x: tile_x * self.step,
            y: tile_y * self.step,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TileIter {}
