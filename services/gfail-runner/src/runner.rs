//! Running a batch of model configurations against one event.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use gfail_common::BoundingBox;
use logistic_model::{validate_configs, BatchReport, Interrupt, LogisticModel, ModelDocument, ModelResult};
use raster_io::{shakemap::sibling_uncertainty, ShakeGrid};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Area, RunnerConfig, Zoom};

/// Statistics of one output grid.
#[derive(Debug, Clone, Serialize)]
pub struct OutputSummary {
    pub key: String,
    pub label: String,
    pub kind: String,
    pub units: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// One model run.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub gfetype: String,
    pub equation: String,
    pub shakemap: String,
    pub slope_thresholding: bool,
    pub uncertainty: bool,
    pub rows: usize,
    pub cols: usize,
    pub outputs: Vec<OutputSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained_store: Option<PathBuf>,
    pub elapsed_ms: u64,
}

/// What the runner writes out.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub event_id: Option<String>,
    pub bounds: Option<BoundingBox>,
    #[serde(flatten)]
    pub report: BatchReport<ModelSummary>,
}

/// Compile every configuration and report which ones fail.
pub fn check(config: &RunnerConfig) -> RunSummary {
    let report = validate_configs(config.configs.as_slice(), &config.model_options(None));
    RunSummary {
        event_id: None,
        bounds: None,
        report: BatchReport {
            succeeded: report
                .succeeded
                .into_iter()
                .map(|(path, model)| {
                    let summary = ModelSummary {
                        model: model.name.clone(),
                        gfetype: model.gfetype.clone(),
                        equation: model.equation.to_string(),
                        shakemap: String::new(),
                        slope_thresholding: model.slope.enabled(),
                        uncertainty: false,
                        rows: 0,
                        cols: 0,
                        outputs: Vec::new(),
                        retained_store: None,
                        elapsed_ms: 0,
                    };
                    (path, summary)
                })
                .collect(),
            failed: report.failed,
        },
    }
}

/// Run every configuration in turn. Failures are recorded and the batch
/// carries on; once `cancel` is set the remaining configurations are
/// recorded as cancelled.
pub async fn run(config: &RunnerConfig, cancel: Arc<AtomicBool>) -> Result<RunSummary> {
    let shake = Arc::new(
        ShakeGrid::load(&config.shakefile)
            .with_context(|| format!("Failed to read shakefile {}", config.shakefile.display()))?,
    );
    let uncertainty = Arc::new(load_uncertainty(config));
    let bounds = area_bounds(&config.area, &shake)?;
    info!(
        event = %shake.event.event_id,
        magnitude = shake.event.magnitude,
        shakemap = %shake.identity(),
        uncertainty = uncertainty.is_some(),
        bounds = ?bounds,
        "Loaded event"
    );

    let mut report = BatchReport::new();
    for path in &config.configs {
        if cancel.load(Ordering::Relaxed) {
            report.record(path, Err::<ModelSummary, _>("cancelled before start"));
            continue;
        }
        let outcome = run_one(config, path, &shake, &uncertainty, bounds, &cancel).await;
        report.record(path, outcome.map_err(|e| format!("{e:#}")));
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Batch complete"
    );

    Ok(RunSummary {
        event_id: Some(shake.event.event_id.clone()),
        bounds,
        report,
    })
}

async fn run_one(
    config: &RunnerConfig,
    path: &Path,
    shake: &Arc<ShakeGrid>,
    uncertainty: &Arc<Option<ShakeGrid>>,
    bounds: Option<BoundingBox>,
    cancel: &Arc<AtomicBool>,
) -> Result<ModelSummary> {
    let doc = ModelDocument::load(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let mut options = config.model_options(bounds);
    options.cancel = Some(cancel.clone());
    options.deadline = config.timeout.map(|t| Instant::now() + t);
    let calculate = config.calculate_options();

    let name = doc.name.clone();
    let shake = shake.clone();
    let uncertainty = uncertainty.clone();
    let mut task = tokio::task::spawn_blocking(move || -> logistic_model::Result<ModelSummary> {
        let start = Instant::now();
        let compiled = logistic_model::compile(&doc, &options)?;
        let model = LogisticModel::from_parts(compiled, &shake, (*uncertainty).as_ref(), options)?;
        let equation = model.equation();
        let slope_thresholding = model.slope_thresholding();
        let has_uncertainty = model.aligned().has_uncertainty();
        let shakemap = model.aligned().shakemap().to_string();
        let gfetype = model.compiled().gfetype.clone();
        let (rows, cols) = model.aligned().geodict().shape();
        let result = model.calculate(&calculate)?;
        Ok(ModelSummary {
            model: doc.name,
            gfetype,
            equation,
            shakemap,
            slope_thresholding,
            uncertainty: has_uncertainty,
            rows,
            cols,
            outputs: summarize(&result),
            retained_store: result.retained_store().cloned(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    });

    // The deadline in `options` stops the task at its next layer or tile.
    let joined = match config.timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(model = %name, timeout = ?limit, "Model timed out, waiting for it to stop");
                if let Ok(Ok(late)) = task.await {
                    discard_retained(&late);
                }
                bail!("{name}: timed out after {limit:?}");
            }
        },
        None => task.await,
    };

    let summary = match joined.map_err(|e| anyhow!("{name}: model task failed: {e}"))? {
        Ok(summary) => summary,
        Err(e) => match (e.interruption(), config.timeout) {
            (Some(Interrupt::DeadlineExceeded), Some(limit)) => {
                warn!(model = %name, timeout = ?limit, error = %e, "Model timed out");
                bail!("{name}: timed out after {limit:?}");
            }
            _ => return Err(anyhow::Error::new(e).context(format!("{name}: model run failed"))),
        },
    };
    info!(
        model = %summary.model,
        outputs = summary.outputs.len(),
        elapsed_ms = summary.elapsed_ms,
        "Model complete"
    );
    Ok(summary)
}

/// Remove the layers a model kept after it was already reported as timed out.
fn discard_retained(summary: &ModelSummary) {
    let Some(path) = &summary.retained_store else {
        return;
    };
    match std::fs::remove_dir_all(path) {
        Ok(()) => info!(path = %path.display(), "Removed layers of timed-out model"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove layers of timed-out model"),
    }
}

/// Statistics of every output, in result order.
pub fn summarize(result: &ModelResult) -> Vec<OutputSummary> {
    result
        .iter()
        .map(|(key, layer)| {
            let stats = layer.grid.finite_stats();
            OutputSummary {
                key: key.to_string(),
                label: layer.label.clone(),
                kind: layer.kind.as_str().to_string(),
                units: layer.description.units.clone(),
                min: stats.map(|s| s.0),
                max: stats.map(|s| s.1),
                mean: stats.map(|s| s.2),
            }
        })
        .collect()
}

/// The explicit uncertainty file, else `uncertainty.xml` next to the
/// shakefile if present. Unreadable files are skipped with a warning.
fn load_uncertainty(config: &RunnerConfig) -> Option<ShakeGrid> {
    let path = match &config.uncertfile {
        Some(path) => path.clone(),
        None => {
            let sibling = sibling_uncertainty(&config.shakefile);
            if !sibling.is_file() {
                return None;
            }
            info!(path = %sibling.display(), "Using uncertainty file next to shakefile");
            sibling
        }
    };
    match ShakeGrid::load(&path) {
        Ok(grid) => Some(grid),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read uncertainty file, ignoring uncertainties");
            None
        }
    }
}

/// Model bounds for the requested area.
pub fn area_bounds(area: &Area, shake: &ShakeGrid) -> Result<Option<BoundingBox>> {
    match area {
        Area::Full => Ok(None),
        Area::Bounds(bounds) => Ok(Some(*bounds)),
        Area::Zoom(zoom) => zoom_bounds(zoom, shake).map(Some),
    }
}

/// Bounds of the cells above the zoom threshold, grown by one cell and
/// kept inside the shaking grid.
fn zoom_bounds(zoom: &Zoom, shake: &ShakeGrid) -> Result<BoundingBox> {
    let found = shake
        .bounds_above_threshold(&zoom.field, zoom.threshold)
        .with_context(|| format!("Cannot zoom on '{}'", zoom.field))?;
    let Some(b) = found else {
        bail!("no cells with {} above {}", zoom.field, zoom.threshold);
    };
    let g = shake.geodict();
    let bounds = BoundingBox::new(
        (b.xmin - g.dx).max(g.xmin),
        (b.xmax + g.dx).min(g.xmax),
        (b.ymin - g.dy).max(g.ymin),
        (b.ymax + g.dy).min(g.ymax),
    );
    info!(
        field = %zoom.field,
        threshold = zoom.threshold,
        xmin = bounds.xmin,
        xmax = bounds.xmax,
        ymin = bounds.ymin,
        ymax = bounds.ymax,
        "Zoomed to shaking"
    );
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfail_common::{GeoGrid, Grid2D};
    use grid_store::StoreConfig;
    use std::time::Duration;
    use test_utils::{shaking_grid, slope_grid, DataDir, ShakeEvent};

    const MODEL: &str = r#"
test_model:
  gfetype: landslide
  baselayer: slope
  shortref: Test (2024)
  longref: Runner test model
  coefficients: {b0: -2.0, b1: 1.0}
  terms: {b1: log(pga)}
  layers:
    slope: {file: slope.asc, units: degrees}
  interpolations: {slope: linear}
"#;

    fn geodict() -> GeoGrid {
        GeoGrid::from_corner(0.0, 9.0, 1.0, 1.0, 10, 10).unwrap()
    }

    fn setup() -> (DataDir, RunnerConfig) {
        let dir = DataDir::new();
        let g = geodict();
        let shakefile = dir.write_shakemap(
            "grid.xml",
            &ShakeEvent::default(),
            &[("pga", "pctg", &shaking_grid(g, (4.0, 4.0), 50.0))],
        );
        dir.write_asc("slope.asc", &slope_grid(g));
        let good = dir.write_text("good.yml", MODEL);
        let bad = dir.write_text("bad.yml", &MODEL.replace("log(pga)", "log(pga) * bogus"));
        let config = RunnerConfig {
            configs: vec![good, bad],
            shakefile,
            data_path: Some(dir.path().to_path_buf()),
            store: StoreConfig::memory(),
            ..RunnerConfig::default()
        };
        (dir, config)
    }

    #[tokio::test]
    async fn test_run_collects_failures() {
        let (_dir, config) = setup();
        let summary = run(&config, Arc::new(AtomicBool::new(false))).await.unwrap();

        assert_eq!(summary.event_id.as_deref(), Some("us20002926"));
        assert_eq!(summary.report.succeeded.len(), 1);
        let model = &summary.report.succeeded[0].1;
        assert_eq!(model.model, "test_model");
        assert_eq!(model.equation, "b0 + (b1 * log(shake(pga)))");
        assert_eq!((model.rows, model.cols), (10, 10));
        assert_eq!(model.outputs[0].key, "model");

        assert_eq!(summary.report.failed.len(), 1);
        assert!(summary.report.failed[0].error.contains("bogus"));

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["succeeded"].is_array());
        assert!(json["failed"][0]["path"].as_str().unwrap().ends_with("bad.yml"));
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_models() {
        let (_dir, config) = setup();
        let summary = run(&config, Arc::new(AtomicBool::new(true))).await.unwrap();
        assert!(summary.report.succeeded.is_empty());
        assert_eq!(summary.report.failed.len(), 2);
        assert_eq!(summary.report.failed[0].error, "cancelled before start");
    }

    #[tokio::test]
    async fn test_timed_out_model_leaves_nothing_behind() {
        let (dir, config) = setup();
        let spill_root = dir.subdir("spill");
        let config = RunnerConfig {
            configs: vec![config.configs[0].clone()],
            store: StoreConfig {
                spill_dir: Some(spill_root.clone()),
                ..StoreConfig::default()
            },
            keep_temp: true,
            timeout: Some(Duration::from_nanos(1)),
            ..config
        };

        let summary = run(&config, Arc::new(AtomicBool::new(false))).await.unwrap();
        assert!(summary.report.succeeded.is_empty());
        assert_eq!(summary.report.failed.len(), 1);
        let error = &summary.report.failed[0].error;
        assert!(error.contains("timed out"), "{error}");
        assert_eq!(std::fs::read_dir(&spill_root).unwrap().count(), 0);
    }

    #[test]
    fn test_check_compiles_only() {
        let (_dir, config) = setup();
        let summary = check(&config);
        assert_eq!(summary.report.succeeded.len(), 1);
        assert_eq!(summary.report.failed.len(), 1);
    }

    #[test]
    fn test_zoom_bounds() {
        let dir = DataDir::new();
        let g = geodict();
        let pga = Grid2D::from_fn(g, |row, col| if (3..5).contains(&row) && (6..8).contains(&col) { 10.0 } else { 1.0 });
        let path = dir.write_shakemap("grid.xml", &ShakeEvent::default(), &[("pga", "pctg", &pga)]);
        let shake = ShakeGrid::load(path).unwrap();

        let zoom = Zoom {
            field: "pga".to_string(),
            threshold: 5.0,
        };
        let b = zoom_bounds(&zoom, &shake).unwrap();
        assert_eq!((b.xmin, b.xmax), (5.0, 8.0));
        assert_eq!((b.ymin, b.ymax), (4.0, 7.0));

        let too_high = Zoom {
            threshold: 50.0,
            ..zoom
        };
        assert!(zoom_bounds(&too_high, &shake).is_err());
    }
}
