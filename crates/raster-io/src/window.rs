//! Row/column windows and the buffered cut used to align a source raster
//! onto a target grid.

use gfail_common::{GeoGrid, GeometryError, Grid2D, InterpolationMethod};
use tracing::debug;

use crate::error::Result;
use crate::resample::resample;
use crate::source::RasterSource;

/// Slack when snapping bounds to cell indices, in cells.
const INDEX_TOLERANCE: f64 = 1e-4;

/// A half-open block of rows and columns within a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Window {
    /// The window spanning all of `geodict`.
    pub fn full(geodict: &GeoGrid) -> Self {
        Self {
            row_start: 0,
            row_end: geodict.ny,
            col_start: 0,
            col_end: geodict.nx,
        }
    }

    pub fn width(&self) -> usize {
        self.col_end - self.col_start
    }

    pub fn height(&self) -> usize {
        self.row_end - self.row_start
    }

    /// The window of `source` that covers `target` plus `extra` cells on
    /// every side, clamped to the source. `None` if they do not overlap.
    pub fn covering(source: &GeoGrid, target: &GeoGrid, extra: usize) -> Option<Self> {
        let extra = extra as i64;
        let col_lo = ((target.xmin - source.xmin) / source.dx + INDEX_TOLERANCE).floor() as i64 - extra;
        let col_hi = ((target.xmax - source.xmin) / source.dx - INDEX_TOLERANCE).ceil() as i64 + extra + 1;
        let row_lo = ((source.ymax - target.ymax) / source.dy + INDEX_TOLERANCE).floor() as i64 - extra;
        let row_hi = ((source.ymax - target.ymin) / source.dy - INDEX_TOLERANCE).ceil() as i64 + extra + 1;

        let col_start = col_lo.clamp(0, source.nx as i64) as usize;
        let col_end = col_hi.clamp(0, source.nx as i64) as usize;
        let row_start = row_lo.clamp(0, source.ny as i64) as usize;
        let row_end = row_hi.clamp(0, source.ny as i64) as usize;

        (col_start < col_end && row_start < row_end).then_some(Self {
            row_start,
            row_end,
            col_start,
            col_end,
        })
    }
}

/// Bring `source` onto `target`.
///
/// Only the window covering `target` plus `extra` cells is read. When that
/// window is cell-aligned with `target` and covers it, the matching cells are
/// copied as-is; otherwise the window is resampled with `method` and cells
/// outside the source become NaN.
pub fn cut_to_grid(
    source: &dyn RasterSource,
    target: &GeoGrid,
    method: InterpolationMethod,
    extra: usize,
) -> Result<Grid2D> {
    let native = *source.geodict();
    let window = Window::covering(&native, target, extra).ok_or_else(|| GeometryError::no_overlap(native, target))?;
    let cut = source.read_window(&window)?;
    let cut_grid = *cut.geodict();

    if cut_grid.is_aligned(target) && cut_grid.contains_bounds(target) {
        let (row, col) = cut_grid.fractional_index(target.xmin, target.ymax);
        let (row, col) = (row.round() as usize, col.round() as usize);
        debug!(
            source = %source.describe(),
            row,
            col,
            "Aligned window, copying without resampling"
        );
        let exact = cut.subset(row, row + target.ny, col, col + target.nx)?;
        return Ok(Grid2D::new(exact.into_data(), *target)?);
    }

    debug!(
        source = %source.describe(),
        method = %method,
        window_rows = window.height(),
        window_cols = window.width(),
        "Resampling window onto target grid"
    );
    Ok(resample(&cut, target, method))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(geodict: GeoGrid) -> Grid2D {
        let data = (0..geodict.len()).map(|i| i as f64).collect();
        Grid2D::new(data, geodict).unwrap()
    }

    #[test]
    fn test_covering_adds_extra_cells() {
        let source = GeoGrid::from_corner(0.0, 10.0, 1.0, 1.0, 11, 11).unwrap();
        let target = GeoGrid::from_corner(3.0, 7.0, 1.0, 1.0, 3, 3).unwrap();
        let w = Window::covering(&source, &target, 1).unwrap();
        assert_eq!((w.row_start, w.row_end, w.col_start, w.col_end), (2, 7, 2, 7));

        let clamped = Window::covering(&source, &target, 20).unwrap();
        assert_eq!(clamped, Window::full(&source));
    }

    #[test]
    fn test_covering_disjoint_is_none() {
        let source = GeoGrid::from_corner(0.0, 10.0, 1.0, 1.0, 11, 11).unwrap();
        let target = GeoGrid::from_corner(50.0, 7.0, 1.0, 1.0, 3, 3).unwrap();
        assert!(Window::covering(&source, &target, 5).is_none());
    }

    #[test]
    fn test_aligned_cut_copies_cells() {
        let source = ramp(GeoGrid::from_corner(0.0, 10.0, 1.0, 1.0, 11, 11).unwrap());
        let target = GeoGrid::from_corner(3.0, 7.0, 1.0, 1.0, 2, 2).unwrap();
        let out = cut_to_grid(&source, &target, InterpolationMethod::Cubic, 5).unwrap();
        // rows 3..5, cols 3..5 of the 11-wide ramp
        assert_eq!(out.data(), &[36.0, 37.0, 47.0, 48.0]);
        assert_eq!(out.geodict(), &target);
    }

    #[test]
    fn test_misaligned_cut_resamples() {
        let source = ramp(GeoGrid::from_corner(0.0, 10.0, 1.0, 1.0, 11, 11).unwrap());
        let target = GeoGrid::from_corner(3.5, 7.0, 1.0, 1.0, 2, 1).unwrap();
        let out = cut_to_grid(&source, &target, InterpolationMethod::Linear, 2).unwrap();
        assert!((out.data()[0] - 36.5).abs() < 1e-9);
        assert!((out.data()[1] - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_cut_fails() {
        let source = ramp(GeoGrid::from_corner(0.0, 10.0, 1.0, 1.0, 11, 11).unwrap());
        let target = GeoGrid::from_corner(50.0, 7.0, 1.0, 1.0, 2, 2).unwrap();
        assert!(cut_to_grid(&source, &target, InterpolationMethod::Nearest, 5).is_err());
    }
}
