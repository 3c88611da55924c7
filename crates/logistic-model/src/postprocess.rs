//! Masks and transforms applied to evaluated probabilities.
//!
//! In order: vs30 ceiling, minimum PGV, coverage transform, slope mask.
//! Cells failing a rule become 0; nothing here fails on NaN or overflow.

use tracing::{debug, info};

use crate::aligner::{shake_key, AlignedModel, SLOPE_MASK_KEY};
use crate::compiler::{PROBABILITY_VARIABLE, VS30_LAYER};
use crate::error::EvaluationError;
use crate::evaluator::Probabilities;
use crate::expr::GroundMotion;
use crate::interp;

/// Apply every configured rule to `probs` in place.
pub fn postprocess(aligned: &AlignedModel, probs: &mut Probabilities) -> Result<(), EvaluationError> {
    let model = aligned.model();
    let store = aligned.store();
    let read = |key: &str| {
        store.read_whole(key).map_err(|source| EvaluationError::Slice {
            name: key.to_string(),
            source,
        })
    };

    if let Some(vs30max) = model.vs30max {
        let vs30 = read(VS30_LAYER)?;
        for grid in probs.grids_mut() {
            zero_where(grid.data_mut(), vs30.data(), |v| v > vs30max);
        }
        debug!(vs30max, "Applied vs30 ceiling");
    }

    if let Some(minpgv) = model.minpgv {
        let pgv = read(&shake_key(GroundMotion::Pgv))?;
        for grid in probs.grids_mut() {
            zero_where(grid.data_mut(), pgv.data(), |v| v < minpgv);
        }
        debug!(minpgv, "Applied minimum PGV");
    }

    if let Some(coverage) = &model.coverage {
        for grid in probs.grids_mut() {
            let covered = interp::transform(coverage, PROBABILITY_VARIABLE, grid.data())?;
            grid.data_mut().copy_from_slice(&covered);
        }
        debug!("Applied coverage transform");
    }

    if aligned.has_slope_mask() {
        let mask = read(SLOPE_MASK_KEY)?;
        for grid in probs.grids_mut() {
            for (p, m) in grid.data_mut().iter_mut().zip(mask.data()) {
                let masked = *p * m;
                *p = if masked.is_nan() { 0.0 } else { masked };
            }
        }
        debug!("Applied slope mask");
    } else {
        info!(model = %model.name, "No slope file provided, slope thresholding not applied");
    }

    Ok(())
}

/// Set `values[i]` to 0 where `rule(reference[i])` holds. NaN references
/// never match.
fn zero_where(values: &mut [f64], reference: &[f64], rule: impl Fn(f64) -> bool) {
    for (v, r) in values.iter_mut().zip(reference) {
        if rule(*r) {
            *v = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_where() {
        let mut values = vec![0.4, 0.6, 0.8];
        zero_where(&mut values, &[500.0, 900.0, f64::NAN], |v| v > 760.0);
        assert_eq!(values, vec![0.4, 0.0, 0.8]);
    }
}
