//! End-to-end runs over synthetic rasters and ShakeMap documents.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gfail_common::{GeoGrid, Grid2D};
use grid_store::StoreConfig;
use logistic_model::{
    logistic, validate_configs, CalculateOptions, EvaluationError, Interrupt, LayerKind, LogisticModel,
    ModelDocument, ModelError, ModelOptions, Perturbation,
};
use test_utils::{
    assert_approx_eq, assert_grids_approx_eq, constant_grid, east_west_gradient, shaking_grid, slope_grid, DataDir,
    ShakeEvent,
};

fn geodict() -> GeoGrid {
    GeoGrid::from_corner(0.0, 9.0, 1.0, 1.0, 12, 10).unwrap()
}

fn pga() -> Grid2D {
    shaking_grid(geodict(), (5.0, 5.0), 60.0)
}

/// Predictor rasters plus `grid.xml` and `uncertainty.xml`.
struct Inputs {
    dir: DataDir,
    shakefile: PathBuf,
    uncertfile: PathBuf,
}

fn inputs() -> Inputs {
    let dir = DataDir::new();
    let g = geodict();
    let pgv = east_west_gradient(g, 2.0, 40.0);
    let shakefile = dir.write_shakemap(
        "grid.xml",
        &ShakeEvent::default(),
        &[("pga", "pctg", &pga()), ("pgv", "cms", &pgv)],
    );
    let stdpga = constant_grid(g, 0.5);
    let uncertfile = dir.write_shakemap("uncertainty.xml", &ShakeEvent::default(), &[("stdpga", "ln(pctg)", &stdpga)]);

    dir.write_asc("slope.asc", &slope_grid(g));
    dir.write_asc(
        "vs30.asc",
        &Grid2D::from_fn(g, |_, col| if col < 6 { 500.0 } else { 900.0 }),
    );
    dir.write_asc("precip/precip_Jan.asc", &constant_grid(g, 1.0));
    dir.write_asc("precip/precip_Apr.asc", &constant_grid(g, 2.0));

    Inputs {
        dir,
        shakefile,
        uncertfile,
    }
}

fn options(inputs: &Inputs) -> ModelOptions {
    ModelOptions {
        data_path: Some(inputs.dir.path().to_path_buf()),
        store: StoreConfig::memory(),
        ..ModelOptions::default()
    }
}

fn doc(body: &str) -> ModelDocument {
    ModelDocument::from_yaml_str(body).unwrap()
}

const INTERCEPT_ONLY: &str = r#"
intercept_only:
  gfetype: landslide
  baselayer: slope
  shortref: Test (2024)
  longref: Intercept only test model
  coefficients: {b0: -1.5}
  layers:
    slope: {file: slope.asc, units: degrees}
  interpolations: {slope: linear}
"#;

const SHAKING: &str = r#"
shaking:
  gfetype: liquefaction
  baselayer: slope
  shortref: Test (2024)
  longref: Shaking test model
  coefficients: {b0: -2.0, b1: 1.0, b2: 0.01}
  terms:
    b1: log(pga)
    b2: slope
  layers:
    slope: {file: slope.asc, units: degrees}
  interpolations: {slope: linear}
"#;

#[test]
fn test_intercept_only_is_uniform() {
    let inputs = inputs();
    let model = LogisticModel::new(&doc(INTERCEPT_ONLY), &inputs.shakefile, None, options(&inputs)).unwrap();
    assert_eq!(model.equation(), "b0");
    assert!(!model.slope_thresholding());

    let result = model.calculate(&CalculateOptions::default()).unwrap();
    assert_eq!(result.keys().collect::<Vec<_>>(), vec!["model"]);

    let layer = result.get("model").unwrap();
    let expected = 1.0 / (1.0 + 1.5f64.exp());
    assert!(layer.grid.data().iter().all(|&p| (p - expected).abs() < 1e-15));
    assert_eq!(layer.grid.geodict().shape(), (10, 12));
    assert_eq!(layer.kind, LayerKind::Output);
    assert_eq!(layer.label, "Landslide Probability");
    assert_eq!(layer.description.shakemap, "us20002926_ver9");
    assert_eq!(layer.description.parameters.as_ref().unwrap().modeltype, "landslide");
}

#[test]
fn test_tiling_does_not_change_result() {
    let inputs = inputs();
    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, options(&inputs)).unwrap();

    let whole = model.evaluate(None, None).unwrap();
    for (rows, cols) in [(Some(3), Some(5)), (Some(1), None), (None, Some(7)), (Some(4), Some(4))] {
        let tiled = model.evaluate(rows, cols).unwrap();
        assert_grids_approx_eq!(tiled.p.data(), whole.p.data(), 1e-12);
    }
}

#[test]
fn test_evaluate_is_repeatable() {
    let inputs = inputs();
    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, options(&inputs)).unwrap();

    let first = model.evaluate(Some(4), Some(4)).unwrap();
    let second = model.evaluate(Some(4), Some(4)).unwrap();
    let bits = |g: &Grid2D| g.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first.p), bits(&second.p));
    assert!(first.pmin.is_none());
}

#[test]
fn test_evaluate_matches_equation() {
    let inputs = inputs();
    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, options(&inputs)).unwrap();
    let probs = model.evaluate(None, None).unwrap();

    let slope = slope_grid(geodict());
    for (i, (&p, &a)) in probs.p.data().iter().zip(pga().data()).enumerate() {
        let x = -2.0 + a.ln() + 0.01 * slope.data()[i];
        assert_approx_eq!(p, logistic(x), 1e-12);
    }
}

#[test]
fn test_vs30_ceiling() {
    let inputs = inputs();
    let body = INTERCEPT_ONLY
        .replace("    slope: {file: slope.asc, units: degrees}\n", "    slope: {file: slope.asc, units: degrees}\n    vs30: {file: vs30.asc, units: m/s}\n")
        .replace("{slope: linear}", "{slope: linear, vs30: nearest}")
        + "  vs30max: 760\n";
    let model = LogisticModel::new(&doc(&body), &inputs.shakefile, None, options(&inputs)).unwrap();
    let result = model.calculate(&CalculateOptions::default()).unwrap();

    let grid = &result.get("model").unwrap().grid;
    let expected = logistic(-1.5);
    for row in 0..10 {
        assert_eq!(grid.get(row, 2), Some(expected));
        assert_eq!(grid.get(row, 9), Some(0.0));
    }
}

#[test]
fn test_minimum_pgv() {
    let inputs = inputs();
    let body = INTERCEPT_ONLY.to_string() + "  minpgv: 10.0\n";
    let model = LogisticModel::new(&doc(&body), &inputs.shakefile, None, options(&inputs)).unwrap();
    let result = model.calculate(&CalculateOptions::default()).unwrap();

    let grid = &result.get("model").unwrap().grid;
    assert_eq!(grid.get(0, 0), Some(0.0));
    assert_eq!(grid.get(0, 11), Some(logistic(-1.5)));
}

#[test]
fn test_uncertainty_perturbs_ground_motion() {
    let inputs = inputs();
    let model_options = ModelOptions {
        numstd: 2.0,
        ..options(&inputs)
    };
    let model = LogisticModel::new(
        &doc(SHAKING),
        &inputs.shakefile,
        Some(inputs.uncertfile.as_path()),
        model_options,
    )
    .unwrap();

    let equation = &model.compiled().equation;
    assert_eq!(
        equation.perturbed(Perturbation::Minus).to_string(),
        "b0 + (b1 * log(exp(log(shake(pga)) - numstd * uncert(stdpga)))) + (b2 * layer(slope))"
    );
    assert_eq!(equation.perturbed(Perturbation::Plus).to_string().matches("uncert(stdpga)").count(), 1);

    let probs = model.evaluate(None, None).unwrap();
    let (pmin, pmax) = (probs.pmin.unwrap(), probs.pmax.unwrap());
    let slope = slope_grid(geodict());
    for (i, &a) in pga().data().iter().enumerate() {
        let x = -2.0 + a.ln() + 0.01 * slope.data()[i];
        assert_approx_eq!(pmin.data()[i], logistic(x - 1.0), 1e-12);
        assert_approx_eq!(pmax.data()[i], logistic(x + 1.0), 1e-12);
        assert!(pmin.data()[i] < probs.p.data()[i] && probs.p.data()[i] < pmax.data()[i]);
    }
}

#[test]
fn test_calculate_labels_variants_and_echoes_inputs() {
    let inputs = inputs();
    let model_options = ModelOptions {
        save_inputs: true,
        ..options(&inputs)
    };
    let model = LogisticModel::new(
        &doc(SHAKING),
        &inputs.shakefile,
        Some(inputs.uncertfile.as_path()),
        model_options,
    )
    .unwrap();
    let result = model.calculate(&CalculateOptions::default()).unwrap();

    assert_eq!(
        result.keys().collect::<Vec<_>>(),
        vec!["model", "modelmin", "modelmax", "slope", "pga", "pgamodelmin", "pgamodelmax"]
    );
    assert_eq!(result.get("modelmin").unwrap().label, "Liquefaction Probability (-1.0 std ground motion)");
    assert_eq!(result.get("slope").unwrap().label, "slope (degrees)");
    assert_eq!(result.get("slope").unwrap().kind, LayerKind::Input);
    assert_eq!(result.get("pga").unwrap().label, "PGA (%g)");
    assert_eq!(result.get("pgamodelmax").unwrap().label, "PGA + 1.0 std (%g)");

    let echoed = &result.get("pgamodelmin").unwrap().grid;
    for (&low, &a) in echoed.data().iter().zip(pga().data()) {
        assert_approx_eq!(low, a * (-0.5f64).exp(), 1e-9);
    }
}

#[test]
fn test_missing_uncertainty_file_disables_variants() {
    let inputs = inputs();
    let missing = inputs.dir.path().join("missing.xml");
    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, Some(missing.as_path()), options(&inputs)).unwrap();
    assert!(!model.aligned().has_uncertainty());
    let result = model.calculate(&CalculateOptions::default()).unwrap();
    assert!(!result.contains("modelmin"));
}

#[test]
fn test_slope_mask() {
    let inputs = inputs();
    let body = INTERCEPT_ONLY.to_string() + "  slopefile: slope\n  slopemin: 5\n  slopemax: 90\n";
    let model = LogisticModel::new(&doc(&body), &inputs.shakefile, None, options(&inputs)).unwrap();
    assert!(model.slope_thresholding());

    let result = model.calculate(&CalculateOptions::default()).unwrap();
    let grid = &result.get("model").unwrap().grid;
    assert_eq!(grid.get(3, 0), Some(0.0));
    assert_eq!(grid.get(3, 11), Some(logistic(-1.5)));
}

#[test]
fn test_invalid_slopemod_disables_thresholding() {
    let inputs = inputs();
    let body = INTERCEPT_ONLY.to_string() + "  slopefile: slope\n  slopemod: foo(slope)\n";
    let model = LogisticModel::new(&doc(&body), &inputs.shakefile, None, options(&inputs)).unwrap();
    assert!(!model.slope_thresholding());

    let result = model.calculate(&CalculateOptions::default()).unwrap();
    let grid = &result.get("model").unwrap().grid;
    assert!(grid.data().iter().all(|&p| p == logistic(-1.5)));
}

#[test]
fn test_month_variant_selected_from_event_time() {
    let inputs = inputs();
    let body = r#"
seasonal:
  gfetype: landslide
  baselayer: slope
  coefficients: {b0: 0.0, b1: 1.0}
  terms: {b1: precipMONTH}
  layers:
    slope: {file: slope.asc, units: degrees}
    precip: {file: [precip/precip_Jan.asc, precip/precip_Apr.asc], units: mm}
  interpolations: {slope: linear, precip: nearest}
"#;
    let model = LogisticModel::new(&doc(body), &inputs.shakefile, None, options(&inputs)).unwrap();
    assert!(model.aligned().sources()["precip"].ends_with("precip_Apr.asc"));

    let probs = model.evaluate(None, None).unwrap();
    assert!(probs.p.data().iter().all(|&p| p == logistic(2.0)));
}

#[test]
fn test_missing_month_variant_fails() {
    let inputs = inputs();
    let body = r#"
seasonal:
  gfetype: landslide
  baselayer: slope
  coefficients: {b0: 0.0, b1: 1.0}
  terms: {b1: precipMONTH}
  layers:
    slope: {file: slope.asc, units: degrees}
    precip: {file: [precip/precip_Jan.asc], units: mm}
  interpolations: {slope: linear, precip: nearest}
"#;
    // A single variant is used as-is.
    assert!(LogisticModel::new(&doc(body), &inputs.shakefile, None, options(&inputs)).is_ok());

    let event = ShakeEvent {
        timestamp: "2015-07-04T00:00:00UTC".to_string(),
        ..ShakeEvent::default()
    };
    let july = inputs.dir.write_shakemap("july.xml", &event, &[("pga", "pctg", &pga())]);
    let body = body.replace("[precip/precip_Jan.asc]", "precip");
    let err = LogisticModel::new(&doc(&body), &july, None, options(&inputs)).unwrap_err();
    assert!(matches!(err, ModelError::Alignment(_)), "{err}");
    assert!(err.to_string().contains("Jul"), "{err}");
}

#[test]
fn test_spill_store_matches_memory_store() {
    let inputs = inputs();
    let spill = ModelOptions {
        store: StoreConfig {
            spill_dir: Some(inputs.dir.subdir("spill")),
            ..StoreConfig::default()
        },
        ..options(&inputs)
    };

    let in_memory = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, options(&inputs))
        .unwrap()
        .evaluate(Some(3), Some(4))
        .unwrap();
    let spilled = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, spill)
        .unwrap()
        .evaluate(Some(3), Some(4))
        .unwrap();
    assert_eq!(in_memory.p, spilled.p);
}

#[test]
fn test_cleanup_flag_controls_spill_directory() {
    let inputs = inputs();
    let spill_root = inputs.dir.subdir("spill");
    let spill = || ModelOptions {
        store: StoreConfig {
            spill_dir: Some(spill_root.clone()),
            ..StoreConfig::default()
        },
        ..options(&inputs)
    };

    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, spill()).unwrap();
    let result = model.calculate(&CalculateOptions::default()).unwrap();
    assert!(result.retained_store().is_none());
    assert_eq!(std::fs::read_dir(&spill_root).unwrap().count(), 0);

    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, spill()).unwrap();
    let keep = CalculateOptions {
        cleanup: false,
        ..CalculateOptions::default()
    };
    let result = model.calculate(&keep).unwrap();
    let kept = result.retained_store().unwrap();
    assert!(kept.starts_with(&spill_root));
    assert!(kept.exists());
}

#[test]
fn test_cancelled_calculation_leaves_no_spill_directory() {
    let inputs = inputs();
    let spill_root = inputs.dir.subdir("spill");
    let cancel = Arc::new(AtomicBool::new(false));
    let spill = ModelOptions {
        store: StoreConfig {
            spill_dir: Some(spill_root.clone()),
            ..StoreConfig::default()
        },
        cancel: Some(cancel.clone()),
        ..options(&inputs)
    };

    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, spill).unwrap();
    assert_eq!(std::fs::read_dir(&spill_root).unwrap().count(), 1);

    cancel.store(true, Ordering::Relaxed);
    let keep = CalculateOptions {
        row_chunk: Some(2),
        cleanup: false,
        ..CalculateOptions::default()
    };
    let err = model.calculate(&keep).unwrap_err();
    assert_eq!(err.interruption(), Some(Interrupt::Cancelled));
    assert!(matches!(err, ModelError::Evaluation(EvaluationError::Cancelled(_))), "{err}");
    assert_eq!(std::fs::read_dir(&spill_root).unwrap().count(), 0);
}

#[test]
fn test_deadline_stops_evaluation() {
    let inputs = inputs();
    let deadline = Instant::now() + Duration::from_secs(2);
    let model_options = ModelOptions {
        deadline: Some(deadline),
        ..options(&inputs)
    };
    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, model_options).unwrap();
    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));

    let err = model.evaluate(Some(1), None).unwrap_err();
    assert_eq!(err.interruption(), Some(Interrupt::DeadlineExceeded));
}

#[test]
fn test_missing_shake_field_fails() {
    let inputs = inputs();
    let body = SHAKING.replace("log(pga)", "log(mmi)");
    let err = LogisticModel::new(&doc(&body), &inputs.shakefile, None, options(&inputs)).unwrap_err();
    assert!(err.to_string().contains("mmi"), "{err}");
}

#[test]
fn test_bounds_restrict_model_grid() {
    let inputs = inputs();
    let bounded = ModelOptions {
        bounds: Some(gfail_common::BoundingBox::new(2.0, 6.0, 3.0, 7.0)),
        ..options(&inputs)
    };
    let model = LogisticModel::new(&doc(SHAKING), &inputs.shakefile, None, bounded).unwrap();
    let g = model.aligned().geodict();
    assert_approx_eq!(g.xmin, 2.0, 1e-9);
    assert_approx_eq!(g.xmax, 6.0, 1e-9);
    assert_approx_eq!(g.ymin, 3.0, 1e-9);
    assert_approx_eq!(g.ymax, 7.0, 1e-9);
}

#[test]
fn test_batch_collects_failures() {
    let inputs = inputs();
    let good = inputs.dir.write_text("good.yml", INTERCEPT_ONLY);
    let bad_term = inputs
        .dir
        .write_text("bad_term.yml", &SHAKING.replace("b2: slope", "b2: slope * foo"));
    let no_intercept = inputs
        .dir
        .write_text("no_intercept.yml", &INTERCEPT_ONLY.replace("{b0: -1.5}", "{b1: -1.5}"));
    let missing = inputs.dir.path().join("missing.yml");

    let report = validate_configs(&[&good, &bad_term, &no_intercept, &missing], &options(&inputs));
    assert!(!report.is_success());
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].1.name, "intercept_only");
    assert_eq!(report.failed.len(), 3);
    assert_eq!(report.failed[0].path, bad_term);
    assert!(report.failed[0].error.contains("unknown term fragment: foo"), "{}", report.failed[0].error);
}
