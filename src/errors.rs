use std::fmt::Display;

/// Argument validation failures, detected in full before any resampling work
/// begins. Out-of-bounds sample positions are never errors; they are clipped
/// (forward) or zero-padded (reverse) instead.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GriddingError {
    /// `coords`, `values` and `weights` disagree on the number of samples.
    SampleCountMismatch {
        coords: usize,
        values: usize,
        weights: usize,
    },
    /// A per-axis argument (coordinate columns, half-widths, kernels) does
    /// not match the rank of the grid.
    RankMismatch { axes: usize, grid: usize },
    /// The target grid has no axes, or an axis with zero cells.
    EmptyExtent,
    /// Kernel half-widths must be strictly positive and finite.
    InvalidHalfWidth(f64),
    /// `isofov` must be at least 1 and no larger than half the smallest
    /// grid extent.
    InvalidIsofov { isofov: usize, limit: usize },
}

impl std::error::Error for GriddingError {}

impl Display for GriddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            GriddingError::SampleCountMismatch {
                coords,
                values,
                weights,
            } => write!(
                f,
                "sample count mismatch: {} coordinates, {} values, {} weights",
                coords, values, weights
            ),
            GriddingError::RankMismatch { axes, grid } => write!(
                f,
                "per-axis argument has {} axes but the grid rank is {}",
                axes, grid
            ),
            GriddingError::EmptyExtent => {
                write!(f, "every grid extent must be at least one cell")
            }
            GriddingError::InvalidHalfWidth(h) => {
                write!(f, "kernel half-width must be positive and finite, got {}", h)
            }
            GriddingError::InvalidIsofov { isofov, limit } => write!(
                f,
                "isofov {} outside the valid range 1..={}",
                isofov, limit
            ),
        }
    }
}
