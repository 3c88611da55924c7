//! Tests for grid intersection and box-derived grids as the model aligner
//! uses them.

use gfail_common::{BoundingBox, Containment, GeoGrid, GeometryError, Grid2D};

// ============================================================================
// Shakemap-style cut to user bounds
// ============================================================================

fn shake_grid() -> GeoGrid {
    // 0.5 degree grid over -122..-118 x 34..38
    GeoGrid::from_corner(-122.0, 38.0, 0.5, 0.5, 9, 9).unwrap()
}

#[test]
fn test_user_bounds_cut_outside_rule() {
    let shake = shake_grid();
    let bounds = BoundingBox::new(-121.2, -119.6, 35.1, 36.9);
    let boxed = GeoGrid::from_bbox(&bounds, shake.dx, shake.dy, Containment::Outside).unwrap();
    let cut = shake.bounds_within(&boxed).unwrap();

    assert!(cut.xmin >= shake.xmin);
    assert!(cut.xmax <= shake.xmax);
    assert!(shake.is_aligned(&cut));
    assert!(shake.contains_bounds(&cut));
    // -121.2 snaps forward to -121.0; the outside box reaches -119.2 so -119.5 is kept.
    assert!((cut.xmin - (-121.0)).abs() < 1e-9);
    assert!((cut.xmax - (-119.5)).abs() < 1e-9);
}

#[test]
fn test_base_layer_intersection_keeps_base_resolution() {
    let shake = shake_grid();
    let base = GeoGrid::from_corner(-125.0, 40.0, 0.1, 0.1, 101, 101).unwrap();
    let common = base.bounds_within(&shake).unwrap();

    assert_eq!(common.dx, 0.1);
    assert!(shake.contains_bounds(&common));
    assert!(base.is_aligned(&common));
    assert_eq!(common.nx, 41);
    assert_eq!(common.ny, 41);
}

#[test]
fn test_disjoint_grids_fail() {
    let shake = shake_grid();
    let far = GeoGrid::from_corner(10.0, 10.0, 0.5, 0.5, 4, 4).unwrap();
    let err = far.bounds_within(&shake).unwrap_err();
    assert!(matches!(err, GeometryError::NoOverlap { .. }));
    assert!(err.to_string().contains("do not overlap"));
}

#[test]
fn test_grid2d_subset_matches_subgrid() {
    let shake = shake_grid();
    let data: Vec<f64> = (0..shake.len()).map(|i| i as f64).collect();
    let grid = Grid2D::new(data, shake).unwrap();
    let window = grid.subset(2, 5, 3, 7).unwrap();
    assert_eq!(window.geodict().shape(), (3, 4));
    assert_eq!(window.get(0, 0), grid.get(2, 3));
    assert_eq!(window.get(2, 3), grid.get(4, 6));
}
