//! Building the labeled [`ModelResult`].

use gfail_common::Grid2D;
use grid_store::StoreError;

use crate::aligner::{shake_key, uncertainty_key, AlignedModel};
use crate::error::EvaluationError;
use crate::evaluator::Probabilities;
use crate::expr::Perturbation;
use crate::result::{capitalize, title_case, Description, LayerKind, LayerOutput, ModelParameters, ModelResult};

/// Units of the model output for a short reference.
pub fn model_units(shortref: &str, has_coverage: bool) -> &'static str {
    match (shortref.contains("Jessee"), has_coverage) {
        (true, true) => "areal coverage",
        (true, false) => "relative hazard",
        (false, _) => "probability",
    }
}

/// Label the probability grids and, with `save_inputs`, echo the aligned
/// inputs.
pub fn assemble(
    aligned: &AlignedModel,
    probs: Probabilities,
    save_inputs: bool,
) -> Result<ModelResult, EvaluationError> {
    let model = aligned.model();
    let numstd = aligned.numstd();
    let units = model_units(&model.shortref, model.coverage.is_some());
    let label = format!("{} {}", capitalize(&model.gfetype), title_case(units));

    let description = Description {
        name: model.shortref.clone(),
        longref: model.longref.clone(),
        units: units.to_string(),
        shakemap: aligned.shakemap().to_string(),
        parameters: Some(ModelParameters {
            slopemin: model.slope.min,
            slopemax: model.slope.max,
            modeltype: model.gfetype.clone(),
        }),
    };
    let output = |grid: Grid2D, label: String| LayerOutput {
        grid,
        label,
        kind: LayerKind::Output,
        description: description.clone(),
    };

    let mut result = ModelResult::new();
    result.insert("model", output(probs.p, label.clone()));
    if let Some(pmin) = probs.pmin {
        result.insert("modelmin", output(pmin, format!("{label} (-{numstd:.1} std ground motion)")));
    }
    if let Some(pmax) = probs.pmax {
        result.insert("modelmax", output(pmax, format!("{label} (+{numstd:.1} std ground motion)")));
    }

    if save_inputs {
        echo_inputs(aligned, &mut result)?;
    }
    Ok(result)
}

fn echo_inputs(aligned: &AlignedModel, result: &mut ModelResult) -> Result<(), EvaluationError> {
    let model = aligned.model();
    let store = aligned.store();
    let read = |key: &str| {
        store.read_whole(key).map_err(|source: StoreError| EvaluationError::Slice {
            name: key.to_string(),
            source,
        })
    };
    let input = |grid: Grid2D, label: String, name: String, longref: String, units: &str| LayerOutput {
        grid,
        label,
        kind: LayerKind::Input,
        description: Description {
            name,
            longref,
            units: units.to_string(),
            shakemap: aligned.shakemap().to_string(),
            parameters: None,
        },
    };

    for spec in model.layers.values() {
        if result.contains(&spec.name) {
            continue;
        }
        let grid = read(&spec.name)?;
        result.insert(
            spec.name.clone(),
            input(
                grid,
                format!("{} ({})", spec.name, spec.units),
                spec.shortref.clone(),
                spec.longref.clone(),
                &spec.units,
            ),
        );
    }

    let event = aligned.event();
    let source = event.description.clone().unwrap_or_else(|| event.event_id.clone());
    let numstd = aligned.numstd();

    for gm in &model.ground_motions {
        let upper = gm.as_str().to_uppercase();
        let units = gm.display_units();
        if result.contains(gm.as_str()) {
            continue;
        }
        let raw = read(&shake_key(*gm))?;
        result.insert(
            gm.as_str(),
            input(
                raw.clone(),
                format!("{upper} ({units})"),
                upper.clone(),
                source.clone(),
                units,
            ),
        );

        if !aligned.has_uncertainty() {
            continue;
        }
        let std = read(&uncertainty_key(*gm))?;
        for (suffix, direction) in [("modelmin", Perturbation::Minus), ("modelmax", Perturbation::Plus)] {
            let grid = perturb(&raw, &std, numstd, direction);
            let label = format!("{upper} {} {numstd:.1} std ({units})", direction.symbol());
            result.insert(
                format!("{}{suffix}", gm.as_str()),
                input(grid, label, upper.clone(), source.clone(), units),
            );
        }
    }
    Ok(())
}

/// `exp(log(raw) -/+ numstd * std)` per cell.
pub fn perturb(raw: &Grid2D, std: &Grid2D, numstd: f64, direction: Perturbation) -> Grid2D {
    let offset = direction.sign() * numstd;
    let values = raw.data();
    let spread = std.data();
    let nx = raw.geodict().nx;
    Grid2D::from_fn(*raw.geodict(), |row, col| {
        let i = row * nx + col;
        (values[i].ln() + offset * spread[i]).exp()
    })
}
