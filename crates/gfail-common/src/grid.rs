//! Raster values paired with their sampling grid.

use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, GeometryResult};
use crate::geodict::GeoGrid;

/// A north-up raster: row-major values (row 0 is the northern edge) and the
/// [`GeoGrid`] they sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid2D {
    data: Vec<f64>,
    geodict: GeoGrid,
}

impl Grid2D {
    /// Create a grid, checking that the data length matches the geometry.
    pub fn new(data: Vec<f64>, geodict: GeoGrid) -> GeometryResult<Self> {
        if data.len() != geodict.len() {
            return Err(GeometryError::ShapeMismatch {
                ny: geodict.ny,
                nx: geodict.nx,
                actual: data.len(),
            });
        }
        Ok(Self { data, geodict })
    }

    /// A grid with every cell set to `value`.
    pub fn filled(geodict: GeoGrid, value: f64) -> Self {
        Self {
            data: vec![value; geodict.len()],
            geodict,
        }
    }

    /// A grid whose cell (`row`, `col`) is `f(row, col)`.
    pub fn from_fn(geodict: GeoGrid, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(geodict.len());
        for row in 0..geodict.ny {
            for col in 0..geodict.nx {
                data.push(f(row, col));
            }
        }
        Self { data, geodict }
    }

    pub fn geodict(&self) -> &GeoGrid {
        &self.geodict
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Values for in-place updates; the length is fixed.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Value at (`row`, `col`), or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.geodict.ny || col >= self.geodict.nx {
            return None;
        }
        self.data.get(row * self.geodict.nx + col).copied()
    }

    /// Copy out rows `row_start..row_end`, columns `col_start..col_end`.
    pub fn subset(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> GeometryResult<Grid2D> {
        let geodict = self.geodict.subgrid(row_start, row_end, col_start, col_end)?;
        let nx = self.geodict.nx;
        let mut data = Vec::with_capacity(geodict.len());
        for row in row_start..row_end {
            data.extend_from_slice(&self.data[row * nx + col_start..row * nx + col_end]);
        }
        Ok(Self { data, geodict })
    }

    /// Apply `f` to every value.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Grid2D {
        Grid2D {
            data: self.data.iter().map(|&v| f(v)).collect(),
            geodict: self.geodict,
        }
    }

    /// (min, max, mean) over the finite values, `None` if there are none.
    pub fn finite_stats(&self) -> Option<(f64, f64, f64)> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in self.data.iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| (min, max, sum / count as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geodict() -> GeoGrid {
        GeoGrid::from_corner(0.0, 2.0, 1.0, 1.0, 3, 3).unwrap()
    }

    #[test]
    fn test_new_checks_length() {
        assert!(Grid2D::new(vec![0.0; 9], geodict()).is_ok());
        assert!(matches!(
            Grid2D::new(vec![0.0; 8], geodict()),
            Err(GeometryError::ShapeMismatch { actual: 8, .. })
        ));
    }

    #[test]
    fn test_get_and_subset() {
        let grid = Grid2D::new((0..9).map(f64::from).collect(), geodict()).unwrap();
        assert_eq!(grid.get(1, 1), Some(4.0));
        assert_eq!(grid.get(3, 0), None);

        let sub = grid.subset(1, 3, 0, 2).unwrap();
        assert_eq!(sub.data(), &[3.0, 4.0, 6.0, 7.0]);
        assert!((sub.geodict().ymax - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_finite_stats_skip_nan() {
        let grid = Grid2D::new(
            vec![1.0, f64::NAN, 3.0, 5.0, f64::INFINITY, 2.0, 4.0, 6.0, 0.0],
            geodict(),
        )
        .unwrap();
        let (min, max, mean) = grid.finite_stats().unwrap();
        assert_eq!(min, 0.0);
        assert_eq!(max, 6.0);
        assert!((mean - 3.0).abs() < 1e-12);
        assert!(Grid2D::filled(geodict(), f64::NAN).finite_stats().is_none());
    }
}
