//! Tiled evaluation of the model equation.

use std::cell::RefCell;
use std::collections::HashMap;

use gfail_common::Grid2D;
use grid_store::{partition, ChunkStore, Tile};
use rayon::prelude::*;
use tracing::debug;

use crate::aligner::{shake_key, uncertainty_key, AlignedModel};
use crate::compiler::Equation;
use crate::error::EvaluationError;
use crate::expr::{GroundMotion, Perturbation};
use crate::interp::{eval, Scope, Value};

/// Probability grids for the nominal equation and, with uncertainty, the
/// perturbed ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities {
    pub p: Grid2D,
    pub pmin: Option<Grid2D>,
    pub pmax: Option<Grid2D>,
}

impl Probabilities {
    /// Every present grid, nominal first.
    pub fn grids_mut(&mut self) -> impl Iterator<Item = &mut Grid2D> {
        std::iter::once(&mut self.p).chain(self.pmin.as_mut()).chain(self.pmax.as_mut())
    }
}

/// Evaluate the model over tiles of at most `row_chunk` x `col_chunk`
/// cells (`None`: whole axis). Stops at the next tile once the aligned
/// model is cancelled or past its deadline.
pub fn evaluate(
    aligned: &AlignedModel,
    row_chunk: Option<usize>,
    col_chunk: Option<usize>,
) -> Result<Probabilities, EvaluationError> {
    let geodict = *aligned.geodict();
    let (rows, cols) = geodict.shape();
    let tiles = partition(rows, cols, row_chunk, col_chunk).map_err(EvaluationError::Tiles)?;
    debug!(
        rows,
        cols,
        row_chunk = ?row_chunk,
        col_chunk = ?col_chunk,
        tiles = tiles.len(),
        "Evaluating model"
    );

    let equation = &aligned.model().equation;
    let p = probability(aligned, equation, &tiles)?;

    let (pmin, pmax) = if aligned.has_uncertainty() {
        let minus = equation.perturbed(Perturbation::Minus);
        let plus = equation.perturbed(Perturbation::Plus);
        (
            Some(probability(aligned, &minus, &tiles)?),
            Some(probability(aligned, &plus, &tiles)?),
        )
    } else {
        (None, None)
    };

    Ok(Probabilities { p, pmin, pmax })
}

/// `1 / (1 + exp(-x))`.
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn probability(aligned: &AlignedModel, equation: &Equation, tiles: &[Tile]) -> Result<Grid2D, EvaluationError> {
    let geodict = *aligned.geodict();
    let store = aligned.store();
    let magnitude = aligned.event().magnitude;
    let numstd = aligned.numstd();

    let blocks = tiles
        .par_iter()
        .map(|tile| {
            aligned.check_interrupt(&format!("tile {tile}"))?;
            let scope = TileScope::new(store, *tile, magnitude, numstd);
            linear_predictor(equation, &scope, tile.len()).map(|x| (*tile, x))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let nx = geodict.nx;
    let mut x = vec![f64::NAN; geodict.len()];
    for (tile, values) in blocks {
        for (i, row) in (tile.row_start..tile.row_end).enumerate() {
            let src = &values[i * tile.cols()..(i + 1) * tile.cols()];
            x[row * nx + tile.col_start..row * nx + tile.col_end].copy_from_slice(src);
        }
    }

    x.iter_mut().for_each(|v| *v = logistic(*v));
    let len = x.len();
    Grid2D::new(x, geodict).map_err(|_| EvaluationError::LengthMismatch {
        left: len,
        right: geodict.len(),
    })
}

/// `b0 + (b1 * term1) + ...` over one scope, summed left to right.
pub fn linear_predictor(equation: &Equation, scope: &dyn Scope, len: usize) -> Result<Vec<f64>, EvaluationError> {
    let mut x = Value::Scalar(equation.intercept);
    for term in &equation.terms {
        let weight = term.weight;
        let value = eval(&term.expr, scope)?.map(|t| weight * t);
        x = x.zip_with(value, |a, b| a + b)?;
    }
    x.into_array(len)
}

/// Store slices of one tile, read at most once each.
struct TileScope<'a> {
    store: &'a dyn ChunkStore,
    tile: Tile,
    magnitude: f64,
    numstd: f64,
    cache: RefCell<HashMap<String, Vec<f64>>>,
}

impl<'a> TileScope<'a> {
    fn new(store: &'a dyn ChunkStore, tile: Tile, magnitude: f64, numstd: f64) -> Self {
        Self {
            store,
            tile,
            magnitude,
            numstd,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn slice(&self, key: &str) -> Result<Vec<f64>, EvaluationError> {
        if let Some(values) = self.cache.borrow().get(key) {
            return Ok(values.clone());
        }
        let values = self
            .store
            .read_slice(key, &self.tile)
            .map_err(|source| EvaluationError::Slice {
                name: key.to_string(),
                source,
            })?;
        self.cache.borrow_mut().insert(key.to_string(), values.clone());
        Ok(values)
    }
}

impl Scope for TileScope<'_> {
    fn layer(&self, name: &str) -> Result<Vec<f64>, EvaluationError> {
        self.slice(name)
    }

    fn shake(&self, gm: GroundMotion) -> Result<Vec<f64>, EvaluationError> {
        self.slice(&shake_key(gm))
    }

    fn uncertainty(&self, gm: GroundMotion) -> Result<Vec<f64>, EvaluationError> {
        self.slice(&uncertainty_key(gm))
    }

    fn magnitude(&self) -> Result<f64, EvaluationError> {
        Ok(self.magnitude)
    }

    fn numstd(&self) -> f64 {
        self.numstd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompiledTerm;
    use crate::expr::Expr;
    use gfail_common::GeoGrid;
    use grid_store::MemoryStore;
    use test_utils::ramp_grid;

    fn store() -> MemoryStore {
        let geodict = GeoGrid::from_corner(0.0, 5.0, 1.0, 1.0, 7, 6).unwrap();
        let mut store = MemoryStore::new(geodict);
        store.put("slope", &ramp_grid(geodict)).unwrap();
        store.put("shake.pga", &ramp_grid(geodict).map(|v| v / 100.0 + 1.0)).unwrap();
        store
    }

    fn equation() -> Equation {
        Equation {
            intercept: -2.0,
            terms: vec![
                CompiledTerm {
                    coefficient: "b1".to_string(),
                    index: 1,
                    weight: 0.001,
                    source: "slope".to_string(),
                    expr: Expr::Layer("slope".to_string()),
                    time_field: None,
                },
                CompiledTerm {
                    coefficient: "b2".to_string(),
                    index: 2,
                    weight: 0.5,
                    source: "log(pga)".to_string(),
                    expr: Expr::Call(crate::expr::Function::Log, vec![Expr::Shake(GroundMotion::Pga)]),
                    time_field: None,
                },
            ],
        }
    }

    #[test]
    fn test_linear_predictor_per_tile() {
        let store = store();
        let tile = Tile::new(1, 3, 2, 5);
        let scope = TileScope::new(&store, tile, 7.0, 1.0);
        let x = linear_predictor(&equation(), &scope, tile.len()).unwrap();

        let slope = store.read_slice("slope", &tile).unwrap();
        let pga = store.read_slice("shake.pga", &tile).unwrap();
        for i in 0..tile.len() {
            let expected = -2.0 + 0.001 * slope[i] + 0.5 * pga[i].ln();
            assert_eq!(x[i], expected);
        }
    }

    #[test]
    fn test_intercept_only_fills_tile() {
        let store = store();
        let tile = Tile::new(0, 2, 0, 3);
        let scope = TileScope::new(&store, tile, 7.0, 1.0);
        let eq = Equation {
            intercept: 0.25,
            terms: Vec::new(),
        };
        assert_eq!(linear_predictor(&eq, &scope, 6).unwrap(), vec![0.25; 6]);
    }

    #[test]
    fn test_missing_slice_is_an_error() {
        let store = store();
        let tile = Tile::new(0, 1, 0, 1);
        let scope = TileScope::new(&store, tile, 7.0, 1.0);
        let eq = Equation {
            intercept: 0.0,
            terms: vec![CompiledTerm {
                expr: Expr::Layer("cti".to_string()),
                ..equation().terms[0].clone()
            }],
        };
        assert!(matches!(
            linear_predictor(&eq, &scope, 1),
            Err(EvaluationError::Slice { name, .. }) if name == "cti"
        ));
    }

    #[test]
    fn test_logistic() {
        assert_eq!(logistic(0.0), 0.5);
        assert!(logistic(-800.0) >= 0.0);
        assert_eq!(logistic(800.0), 1.0);
        assert!(logistic(f64::NAN).is_nan());
    }
}
