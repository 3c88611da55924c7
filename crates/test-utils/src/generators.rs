//! Test data generators for synthetic predictor and shaking grids.
//!
//! These generators create predictable, verifiable patterns that can be
//! used across the test suite.

use gfail_common::{GeoGrid, Grid2D};

/// A grid over `geodict` with predictable values.
///
/// Each cell value is `col * 1000 + row`, so a read can be checked by
/// asserting `grid[row][col] == col * 1000 + row`.
///
/// # Example
///
/// ```
/// use gfail_common::GeoGrid;
/// use test_utils::ramp_grid;
///
/// let g = GeoGrid::from_corner(0.0, 4.0, 1.0, 1.0, 10, 5).unwrap();
/// let grid = ramp_grid(g);
/// assert_eq!(grid.get(0, 1), Some(1000.0));
/// assert_eq!(grid.get(1, 0), Some(1.0));
/// ```
pub fn ramp_grid(geodict: GeoGrid) -> Grid2D {
    Grid2D::from_fn(geodict, |row, col| (col * 1000 + row) as f64)
}

/// A grid with every cell set to `value`.
pub fn constant_grid(geodict: GeoGrid, value: f64) -> Grid2D {
    Grid2D::filled(geodict, value)
}

/// Values rising linearly from `west` at the first column to `east` at
/// the last.
pub fn east_west_gradient(geodict: GeoGrid, west: f64, east: f64) -> Grid2D {
    let span = (geodict.nx.max(2) - 1) as f64;
    Grid2D::from_fn(geodict, |_, col| west + (east - west) * col as f64 / span)
}

/// Slope-like values in degrees: 0 in the west, 60 in the east.
pub fn slope_grid(geodict: GeoGrid) -> Grid2D {
    east_west_gradient(geodict, 0.0, 60.0)
}

/// Shaking that decays with distance from an epicenter, in the units of
/// `peak` (e.g. %g). Never drops below 0.1 so that log terms stay finite.
pub fn shaking_grid(geodict: GeoGrid, epicenter: (f64, f64), peak: f64) -> Grid2D {
    Grid2D::from_fn(geodict, |row, col| {
        let (x, y) = geodict.cell_center(row, col);
        let dist = ((x - epicenter.0).powi(2) + (y - epicenter.1).powi(2)).sqrt();
        (peak / (1.0 + dist * dist)).max(0.1)
    })
}
