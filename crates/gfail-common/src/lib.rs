//! Common types and utilities shared across the ground-failure crates.
//!
//! - [`GeoGrid`]: a regular geographic sampling grid (cell-center bounds,
//!   cell size, dimensions) with the intersection and alignment arithmetic
//!   every other crate relies on.
//! - [`Grid2D`]: row-major raster values paired with their [`GeoGrid`].
//! - [`BoundingBox`]: a user supplied geographic box.

pub mod bbox;
pub mod error;
pub mod geodict;
pub mod grid;
pub mod interpolation;

pub use bbox::BoundingBox;
pub use error::{GeometryError, GeometryResult};
pub use geodict::{Containment, GeoGrid};
pub use grid::Grid2D;
pub use interpolation::InterpolationMethod;
