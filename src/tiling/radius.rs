use clap::ValueEnum;

/// Neighbourhood shape used for radius expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RadiusShape {
    /// Every offset with `max(|i|, |j|) <= radius`
    Square,
    /// Every offset with `i² + j² <= radius²`
    #[default]
    Circle,
}

/// Enumerates grid neighbours of an accepted tile.
///
/// Neighbours are offsets `(i * stride, j * stride)` from the centre, visited
/// row by row (`j` outer, `i` inner). The centre itself is included. Offsets
/// whose square would leave the slide are dropped.
///
/// # Example
///
/// ```
/// use wsi_patcher::tiling::{RadiusExpander, RadiusShape};
///
/// let expander = RadiusExpander::new(1, 512, RadiusShape::Square);
/// let neighbors = expander.neighbors((0, 0), 512, (2048, 2048));
/// assert_eq!(neighbors, vec![(0, 0), (512, 0), (0, 512), (512, 512)]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusExpander {
    radius: u32,
    stride: u32,
    shape: RadiusShape,
}

impl RadiusExpander {
    pub fn new(radius: u32, stride: u32, shape: RadiusShape) -> Self {
        Self {
            radius,
            stride: stride.max(1),
            shape,
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn shape(&self) -> RadiusShape {
        self.shape
    }

    /// Neighbours of `center` whose `patch_size` square fits in `bounds`.
    pub fn neighbors(
        &self,
        center: (u32, u32),
        patch_size: u32,
        bounds: (u32, u32),
    ) -> Vec<(u32, u32)> {
        let r = i64::from(self.radius);
        let stride = i64::from(self.stride);
        let max_x = i64::from(bounds.0) - i64::from(patch_size);
        let max_y = i64::from(bounds.1) - i64::from(patch_size);

        let mut out = Vec::new();
        for j in -r..=r {
            for i in -r..=r {
                if self.shape == RadiusShape::Circle && i * i + j * j > r * r {
                    continue;
                }
                let x = i64::from(center.0) + i * stride;
                let y = i64::from(center.1) + j * stride;
                if (0..=max_x).contains(&x) && (0..=max_y).contains(&y) {
                    out.push((x as u32, y as u32));
                }
            }
        }
        out
    }
}
