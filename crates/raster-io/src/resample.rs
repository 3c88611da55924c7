//! Interpolation kernels and grid-to-grid resampling.
//!
//! Kernels take fractional (column, row) positions in the source array.

use gfail_common::{GeoGrid, Grid2D, InterpolationMethod};

/// Slack on the source edges, in cells.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Nearest neighbor interpolation.
///
/// Returns the value of the nearest grid point.
pub fn nearest_interpolate(data: &[f64], width: usize, height: usize, x: f64, y: f64) -> f64 {
    let col = x.round().max(0.0) as usize;
    let row = y.round().max(0.0) as usize;

    if col >= width || row >= height {
        return f64::NAN;
    }

    data[row * width + col]
}

/// Bilinear interpolation.
///
/// Smoothly interpolates between the four nearest grid points. NaN if any
/// of them is NaN.
pub fn bilinear_interpolate(data: &[f64], width: usize, height: usize, x: f64, y: f64) -> f64 {
    let x0 = x.floor().max(0.0) as usize;
    let y0 = y.floor().max(0.0) as usize;

    if x0 >= width || y0 >= height {
        return f64::NAN;
    }

    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64).clamp(0.0, 1.0);
    let yf = (y - y0 as f64).clamp(0.0, 1.0);

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Bicubic interpolation over the 16 surrounding points, falling back to
/// bilinear when any of them is NaN.
pub fn cubic_interpolate(data: &[f64], width: usize, height: usize, x: f64, y: f64) -> f64 {
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;

    let xf = x - xi as f64;
    let yf = y - yi as f64;

    let mut values = [[0.0f64; 4]; 4];
    for (j, row) in values.iter_mut().enumerate() {
        for (i, value) in row.iter_mut().enumerate() {
            let px = (xi + i as i64 - 1).clamp(0, width as i64 - 1) as usize;
            let py = (yi + j as i64 - 1).clamp(0, height as i64 - 1) as usize;
            *value = data[py * width + px];
            if value.is_nan() {
                return bilinear_interpolate(data, width, height, x, y);
            }
        }
    }

    let mut row_values = [0.0f64; 4];
    for (out, row) in row_values.iter_mut().zip(values.iter()) {
        *out = cubic_1d(row[0], row[1], row[2], row[3], xf);
    }

    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D Catmull-Rom spline.
fn cubic_1d(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

/// Sample `src` at every cell center of `target`.
///
/// Target cells outside the source are NaN. Nearest neighbor reaches half a
/// cell past the outermost source centers; linear and cubic stop at them.
pub fn resample(src: &Grid2D, target: &GeoGrid, method: InterpolationMethod) -> Grid2D {
    let geodict = src.geodict();
    let (height, width) = geodict.shape();
    let data = src.data();

    let reach = match method {
        InterpolationMethod::Nearest => 0.5,
        InterpolationMethod::Linear | InterpolationMethod::Cubic => EDGE_TOLERANCE,
    };
    let max_col = (width - 1) as f64;
    let max_row = (height - 1) as f64;

    Grid2D::from_fn(*target, |row, col| {
        let (x, y) = target.cell_center(row, col);
        let (sy, sx) = geodict.fractional_index(x, y);

        if sx < -reach || sy < -reach || sx > max_col + reach || sy > max_row + reach {
            return f64::NAN;
        }
        let sx = sx.clamp(0.0, max_col);
        let sy = sy.clamp(0.0, max_row);

        match method {
            InterpolationMethod::Nearest => nearest_interpolate(data, width, height, sx, sy),
            InterpolationMethod::Linear => bilinear_interpolate(data, width, height, sx, sy),
            InterpolationMethod::Cubic => cubic_interpolate(data, width, height, sx, sy),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[rustfmt::skip]
    fn test_nearest_interpolate() {
        let data = vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];

        assert_eq!(nearest_interpolate(&data, 3, 3, 0.0, 0.0), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 1.0, 1.0), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.4, 0.4), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.6, 0.6), 5.0);
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data = vec![1.0, 2.0, 3.0, 4.0];

        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 0.0), 1.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 0.0), 2.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 1.0), 3.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 1.0), 4.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.5, 0.5), 2.5);
    }

    #[test]
    fn test_bilinear_propagates_nan() {
        let data = vec![1.0, f64::NAN, 3.0, 4.0];
        assert!(bilinear_interpolate(&data, 2, 2, 0.5, 0.5).is_nan());
    }

    #[test]
    fn test_cubic_reproduces_linear_ramp() {
        let data: Vec<f64> = (0..36).map(|i| (i % 6) as f64 * 2.0).collect();
        let v = cubic_interpolate(&data, 6, 6, 2.25, 2.5);
        assert!((v - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_resample_pads_outside_source() {
        let src_grid = GeoGrid::from_corner(0.0, 2.0, 1.0, 1.0, 3, 3).unwrap();
        let src = Grid2D::new((0..9).map(f64::from).collect(), src_grid).unwrap();
        // Half-cell grid reaching one cell past the east edge
        let target = GeoGrid::from_corner(1.0, 2.0, 0.5, 0.5, 5, 1).unwrap();

        let linear = resample(&src, &target, InterpolationMethod::Linear);
        assert_eq!(&linear.data()[..3], &[1.0, 1.5, 2.0]);
        assert!(linear.data()[3].is_nan());
        assert!(linear.data()[4].is_nan());

        let nearest = resample(&src, &target, InterpolationMethod::Nearest);
        assert_eq!(nearest.data()[3], 2.0);
        assert!(nearest.data()[4].is_nan());
    }

    #[test]
    fn test_resample_same_grid_is_identity() {
        let g = GeoGrid::from_corner(-120.0, 40.0, 0.1, 0.1, 4, 3).unwrap();
        let src = Grid2D::new((0..12).map(|v| v as f64 * 1.5).collect(), g).unwrap();
        for method in InterpolationMethod::ALL {
            let out = resample(&src, &g, method);
            for (a, b) in out.data().iter().zip(src.data()) {
                assert!((a - b).abs() < 1e-9, "{method}: {a} != {b}");
            }
        }
    }
}
