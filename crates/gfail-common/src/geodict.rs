//! Regular geographic sampling grids.
//!
//! A [`GeoGrid`] describes where the cells of a north-up raster sit: the
//! bounds are the coordinates of the *centers* of the outermost cells, so a
//! grid with `nx` columns spans `(nx - 1) * dx` between `xmin` and `xmax`.
//! Row 0 is the northern edge (`ymax`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{GeometryError, GeometryResult};

/// Tolerance for bound comparisons, as a fraction of one cell.
const CELL_TOLERANCE: f64 = 1e-4;

/// How a grid derived from a box relates to that box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Containment {
    /// The grid fits fully within the box.
    Inside,
    /// The grid fully contains the box, overshooting by up to one cell.
    Outside,
}

/// Specification of a regular lat/lon sampling grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoGrid {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
}

impl GeoGrid {
    /// Create a grid from its full description, checking the invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        xmin: f64,
        xmax: f64,
        ymin: f64,
        ymax: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
    ) -> GeometryResult<Self> {
        check_cell_size(dx, dy)?;
        if ![xmin, xmax, ymin, ymax].iter().all(|v| v.is_finite()) {
            return Err(GeometryError::InvalidBounds(format!(
                "non-finite bounds ({xmin}, {xmax}, {ymin}, {ymax})"
            )));
        }
        if xmin > xmax || ymin > ymax {
            return Err(GeometryError::InvalidBounds(format!(
                "inverted bounds ({xmin}, {xmax}, {ymin}, {ymax})"
            )));
        }
        if nx == 0 || ny == 0 {
            return Err(GeometryError::InvalidBounds("empty grid".to_string()));
        }

        let expected_nx = ((xmax - xmin) / dx).round() as usize + 1;
        let expected_ny = ((ymax - ymin) / dy).round() as usize + 1;
        if expected_nx != nx || expected_ny != ny {
            return Err(GeometryError::InvalidBounds(format!(
                "dimensions {ny}x{nx} disagree with bounds and cell size (expected {expected_ny}x{expected_nx})"
            )));
        }

        Ok(Self {
            xmin,
            xmax,
            ymin,
            ymax,
            dx,
            dy,
            nx,
            ny,
        })
    }

    /// Create a grid anchored at its north-west cell center.
    pub fn from_corner(xmin: f64, ymax: f64, dx: f64, dy: f64, nx: usize, ny: usize) -> GeometryResult<Self> {
        check_cell_size(dx, dy)?;
        if nx == 0 || ny == 0 {
            return Err(GeometryError::InvalidBounds("empty grid".to_string()));
        }
        Self::new(
            xmin,
            xmin + (nx - 1) as f64 * dx,
            ymax - (ny - 1) as f64 * dy,
            ymax,
            dx,
            dy,
            nx,
            ny,
        )
    }

    /// Derive a grid with the given cell size from a bounding box.
    ///
    /// The grid is anchored at (`xmin`, `ymax`). With [`Containment::Outside`]
    /// the far edges are pushed out to the next whole cell; with
    /// [`Containment::Inside`] they are pulled in.
    pub fn from_box(
        xmin: f64,
        xmax: f64,
        ymin: f64,
        ymax: f64,
        dx: f64,
        dy: f64,
        containment: Containment,
    ) -> GeometryResult<Self> {
        check_cell_size(dx, dy)?;
        if xmin > xmax || ymin > ymax {
            return Err(GeometryError::InvalidBounds(format!(
                "inverted box ({xmin}, {xmax}, {ymin}, {ymax})"
            )));
        }

        let cells_x = (xmax - xmin) / dx;
        let cells_y = (ymax - ymin) / dy;
        let (nx, ny) = match containment {
            Containment::Inside => (
                (cells_x + CELL_TOLERANCE).floor() as usize + 1,
                (cells_y + CELL_TOLERANCE).floor() as usize + 1,
            ),
            Containment::Outside => (
                (cells_x - CELL_TOLERANCE).ceil().max(0.0) as usize + 1,
                (cells_y - CELL_TOLERANCE).ceil().max(0.0) as usize + 1,
            ),
        };

        Self::from_corner(xmin, ymax, dx, dy, nx, ny)
    }

    /// Derive a grid from a [`BoundingBox`] at the given cell size.
    pub fn from_bbox(bbox: &BoundingBox, dx: f64, dy: f64, containment: Containment) -> GeometryResult<Self> {
        Self::from_box(bbox.xmin, bbox.xmax, bbox.ymin, bbox.ymax, dx, dy, containment)
    }

    /// The largest grid aligned to this grid's cells that fits within both
    /// this grid and `other`.
    pub fn bounds_within(&self, other: &GeoGrid) -> GeometryResult<GeoGrid> {
        let c0 = ((other.xmin - self.xmin) / self.dx - CELL_TOLERANCE).ceil().max(0.0);
        let c1 = ((other.xmax - self.xmin) / self.dx + CELL_TOLERANCE)
            .floor()
            .min((self.nx - 1) as f64);
        let r0 = ((self.ymax - other.ymax) / self.dy - CELL_TOLERANCE).ceil().max(0.0);
        let r1 = ((self.ymax - other.ymin) / self.dy + CELL_TOLERANCE)
            .floor()
            .min((self.ny - 1) as f64);

        if c1 < c0 || r1 < r0 {
            return Err(GeometryError::no_overlap(self, other));
        }

        self.subgrid(r0 as usize, r1 as usize + 1, c0 as usize, c1 as usize + 1)
    }

    /// Check whether two grids share cell size and cell registration.
    pub fn is_aligned(&self, other: &GeoGrid) -> bool {
        let same_dx = (self.dx - other.dx).abs() <= CELL_TOLERANCE * self.dx;
        let same_dy = (self.dy - other.dy).abs() <= CELL_TOLERANCE * self.dy;
        if !same_dx || !same_dy {
            return false;
        }
        let col_offset = (other.xmin - self.xmin) / self.dx;
        let row_offset = (self.ymax - other.ymax) / self.dy;
        (col_offset - col_offset.round()).abs() <= CELL_TOLERANCE
            && (row_offset - row_offset.round()).abs() <= CELL_TOLERANCE
    }

    /// Check whether `other`'s cell-center bounds lie within this grid's.
    pub fn contains_bounds(&self, other: &GeoGrid) -> bool {
        let tx = CELL_TOLERANCE * self.dx;
        let ty = CELL_TOLERANCE * self.dy;
        other.xmin >= self.xmin - tx
            && other.xmax <= self.xmax + tx
            && other.ymin >= self.ymin - ty
            && other.ymax <= self.ymax + ty
    }

    /// The grid covering rows `row_start..row_end` and columns
    /// `col_start..col_end` of this grid.
    pub fn subgrid(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> GeometryResult<GeoGrid> {
        if row_start >= row_end || col_start >= col_end || row_end > self.ny || col_end > self.nx {
            return Err(GeometryError::OutOfRange(format!(
                "rows {row_start}..{row_end}, cols {col_start}..{col_end} of {}x{}",
                self.ny, self.nx
            )));
        }
        let (x0, y0) = self.cell_center(row_start, col_start);
        Self::from_corner(x0, y0, self.dx, self.dy, col_end - col_start, row_end - row_start)
    }

    /// Grow the grid by `cells` on every side.
    pub fn pad(&self, cells: usize) -> GeoGrid {
        let pad_x = cells as f64 * self.dx;
        let pad_y = cells as f64 * self.dy;
        GeoGrid {
            xmin: self.xmin - pad_x,
            xmax: self.xmax + pad_x,
            ymin: self.ymin - pad_y,
            ymax: self.ymax + pad_y,
            nx: self.nx + 2 * cells,
            ny: self.ny + 2 * cells,
            ..*self
        }
    }

    /// Fractional (row, col) position of a coordinate.
    pub fn fractional_index(&self, x: f64, y: f64) -> (f64, f64) {
        ((self.ymax - y) / self.dy, (x - self.xmin) / self.dx)
    }

    /// Coordinates of the center of cell (`row`, `col`).
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (self.xmin + col as f64 * self.dx, self.ymax - row as f64 * self.dy)
    }

    /// The cell-edge extent as a bounding box.
    pub fn extent(&self) -> BoundingBox {
        BoundingBox::new(
            self.xmin - self.dx / 2.0,
            self.xmax + self.dx / 2.0,
            self.ymin - self.dy / 2.0,
            self.ymax + self.dy / 2.0,
        )
    }

    /// (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }
}

impl fmt::Display for GeoGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[x {:.6}..{:.6}, y {:.6}..{:.6}, d {:.6}x{:.6}, {}x{}]",
            self.xmin, self.xmax, self.ymin, self.ymax, self.dx, self.dy, self.ny, self.nx
        )
    }
}

fn check_cell_size(dx: f64, dy: f64) -> GeometryResult<()> {
    if !(dx.is_finite() && dy.is_finite() && dx > 0.0 && dy > 0.0) {
        return Err(GeometryError::InvalidCellSize { dx, dy });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(xmin: f64, ymax: f64, d: f64, nx: usize, ny: usize) -> GeoGrid {
        GeoGrid::from_corner(xmin, ymax, d, d, nx, ny).unwrap()
    }

    #[test]
    fn test_new_checks_dimensions() {
        assert!(GeoGrid::new(0.0, 9.0, 0.0, 9.0, 1.0, 1.0, 10, 10).is_ok());
        assert!(GeoGrid::new(0.0, 9.0, 0.0, 9.0, 1.0, 1.0, 9, 10).is_err());
        assert!(GeoGrid::new(0.0, 9.0, 0.0, 9.0, 0.0, 1.0, 10, 10).is_err());
        assert!(GeoGrid::new(9.0, 0.0, 0.0, 9.0, 1.0, 1.0, 10, 10).is_err());
    }

    #[test]
    fn test_from_box_outside_overshoots() {
        let g = GeoGrid::from_box(0.0, 2.5, 0.0, 2.5, 1.0, 1.0, Containment::Outside).unwrap();
        assert_eq!(g.nx, 4);
        assert_eq!(g.ny, 4);
        assert!((g.xmax - 3.0).abs() < 1e-12);
        assert!((g.ymin - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_from_box_inside_fits() {
        let g = GeoGrid::from_box(0.0, 2.5, 0.0, 2.5, 1.0, 1.0, Containment::Inside).unwrap();
        assert_eq!(g.nx, 3);
        assert_eq!(g.ny, 3);
        assert!(g.xmax <= 2.5);
        assert!(g.ymin >= 0.0);
    }

    #[test]
    fn test_from_box_exact_multiple_is_stable() {
        // 0.1 steps accumulate drift; the tolerance keeps both rules at 11 cells.
        let inside = GeoGrid::from_box(0.0, 1.0, 0.0, 1.0, 0.1, 0.1, Containment::Inside).unwrap();
        let outside = GeoGrid::from_box(0.0, 1.0, 0.0, 1.0, 0.1, 0.1, Containment::Outside).unwrap();
        assert_eq!(inside.nx, 11);
        assert_eq!(outside.nx, 11);
    }

    #[test]
    fn test_from_box_rejects_bad_cell_size() {
        let err = GeoGrid::from_box(0.0, 1.0, 0.0, 1.0, -1.0, 1.0, Containment::Inside).unwrap_err();
        assert!(matches!(err, GeometryError::InvalidCellSize { .. }));
    }

    #[test]
    fn test_bounds_within_snaps_to_own_cells() {
        let a = grid(0.0, 10.0, 1.0, 11, 11);
        let b = grid(2.5, 7.5, 0.5, 9, 9); // x 2.5..6.5, y 3.5..7.5
        let w = a.bounds_within(&b).unwrap();
        assert_eq!(w.dx, 1.0);
        assert!((w.xmin - 3.0).abs() < 1e-12);
        assert!((w.xmax - 6.0).abs() < 1e-12);
        assert!((w.ymax - 7.0).abs() < 1e-12);
        assert!((w.ymin - 4.0).abs() < 1e-12);
        assert_eq!(w.nx, 4);
        assert_eq!(w.ny, 4);
    }

    #[test]
    fn test_bounds_within_clamps_to_self() {
        let a = grid(0.0, 10.0, 1.0, 11, 11);
        let b = grid(-5.0, 20.0, 1.0, 30, 30);
        let w = a.bounds_within(&b).unwrap();
        assert_eq!(w, a);
    }

    #[test]
    fn test_bounds_within_no_overlap() {
        let a = grid(0.0, 10.0, 1.0, 11, 11);
        let b = grid(20.0, 10.0, 1.0, 5, 5);
        assert!(matches!(a.bounds_within(&b), Err(GeometryError::NoOverlap { .. })));
    }

    #[test]
    fn test_bounds_within_tolerates_drift() {
        let a = grid(0.0, 1.0, 0.1, 11, 11);
        let b = grid(0.3 + 1e-12, 0.7 - 1e-12, 0.1, 3, 3);
        let w = a.bounds_within(&b).unwrap();
        assert_eq!(w.nx, 3);
        assert_eq!(w.ny, 3);
    }

    #[test]
    fn test_is_aligned() {
        let a = grid(0.0, 10.0, 1.0, 11, 11);
        assert!(a.is_aligned(&grid(3.0, 5.0, 1.0, 2, 2)));
        assert!(!a.is_aligned(&grid(3.5, 5.0, 1.0, 2, 2)));
        assert!(!a.is_aligned(&grid(3.0, 5.0, 0.5, 2, 2)));
    }

    #[test]
    fn test_pad_and_subgrid() {
        let a = grid(0.0, 10.0, 1.0, 11, 11);
        let padded = a.pad(2);
        assert_eq!(padded.nx, 15);
        assert!((padded.xmin + 2.0).abs() < 1e-12);
        let sub = a.subgrid(1, 3, 2, 5).unwrap();
        assert_eq!(sub.shape(), (2, 3));
        assert!((sub.xmin - 2.0).abs() < 1e-12);
        assert!((sub.ymax - 9.0).abs() < 1e-12);
        assert!(a.subgrid(0, 12, 0, 1).is_err());
    }

    #[test]
    fn test_fractional_index_roundtrip() {
        let a = grid(-120.0, 40.0, 0.25, 9, 9);
        let (x, y) = a.cell_center(3, 5);
        let (r, c) = a.fractional_index(x, y);
        assert!((r - 3.0).abs() < 1e-12);
        assert!((c - 5.0).abs() < 1e-12);
    }
}
