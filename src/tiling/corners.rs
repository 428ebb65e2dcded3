//! Four-corner containment rule shared by annotation labelling and tissue
//! masks.
//!
//! A square `[x, x+size) × [y, y+size)` is probed at the centres of its four
//! corner pixels. A region qualifies when at least one probe falls inside it
//! and the fraction of probes inside reaches the overlap threshold:
//!
//! | threshold | probes required |
//! |-----------|-----------------|
//! | `1.0`     | 4 (full containment) |
//! | `0.75`    | 3 |
//! | `0.5`     | 2 (boundary tiles admitted) |
//! | `<= 0.25` | 1 |
//!
//! Probing pixel centres rather than the geometric corners keeps a tile that
//! merely touches a polygon edge from counting as inside.

/// Number of probe points per square.
pub const CORNER_COUNT: usize = 4;

/// Centres of the four corner pixels of the square at `(x, y)`.
pub fn corner_samples(x: u32, y: u32, size: u32) -> [(f64, f64); CORNER_COUNT] {
    let left = f64::from(x) + 0.5;
    let top = f64::from(y) + 0.5;
    let right = f64::from(x) + f64::from(size) - 0.5;
    let bottom = f64::from(y) + f64::from(size) - 0.5;
    [(left, top), (right, top), (left, bottom), (right, bottom)]
}

/// Whether `hits` probes inside a region satisfy `threshold`.
pub fn meets_overlap(hits: usize, threshold: f64) -> bool {
    hits > 0 && hits as f64 / CORNER_COUNT as f64 >= threshold
}
