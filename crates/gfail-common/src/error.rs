//! Error types for grid geometry.

use thiserror::Error;

/// Result type alias using GeometryError.
pub type GeometryResult<T> = Result<T, GeometryError>;

/// Errors raised by grid geometry arithmetic.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("grids do not overlap: {a} vs {b}")]
    NoOverlap { a: String, b: String },

    #[error("cell size must be positive and finite (dx={dx}, dy={dy})")]
    InvalidCellSize { dx: f64, dy: f64 },

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("data length {actual} does not match grid shape {ny}x{nx}")]
    ShapeMismatch { ny: usize, nx: usize, actual: usize },

    #[error("index range out of grid: {0}")]
    OutOfRange(String),
}

impl GeometryError {
    /// Create a NoOverlap error from the two grids' debug renderings.
    pub fn no_overlap(a: impl std::fmt::Display, b: impl std::fmt::Display) -> Self {
        Self::NoOverlap {
            a: a.to_string(),
            b: b.to_string(),
        }
    }
}
