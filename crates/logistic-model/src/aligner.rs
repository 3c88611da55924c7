//! Bringing every model input onto one grid.
//!
//! The model grid is the shaking grid (optionally cut to user bounds)
//! intersected with the base layer's cells. Predictor layers, the shaking
//! fields, their uncertainties and the slope mask are cut to that grid and
//! written to a [`ChunkStore`] under these keys:
//!
//! - `<layer>` for predictor layers
//! - `shake.<field>` for shaking fields
//! - `uncert.<field>` for uncertainty fields
//! - `mask.slope` for the slope mask (1 inside the slope range, else 0)

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gfail_common::{Containment, GeoGrid, GeometryError, Grid2D, InterpolationMethod};
use grid_store::{open_store, ChunkStore};
use indexmap::IndexMap;
use raster_io::{cut_to_grid, EventInfo, RasterError, RasterFile, RasterSource, ShakeGrid};
use tracing::{debug, info, warn};

use crate::compiler::{CompiledModel, LayerSpec, SlopeSource, SlopeTransform, SLOPE_VARIABLE};
use crate::error::{AlignmentError, EvaluationError};
use crate::expr::{GroundMotion, TimeField};
use crate::interp;
use crate::options::{Interrupt, ModelOptions};

/// Store key of the slope mask.
pub const SLOPE_MASK_KEY: &str = "mask.slope";

/// Store key of a shaking field.
pub fn shake_key(gm: GroundMotion) -> String {
    format!("shake.{}", gm.as_str())
}

/// Store key of an uncertainty field.
pub fn uncertainty_key(gm: GroundMotion) -> String {
    format!("uncert.{}", gm.uncertainty_field())
}

/// A compiled model with every input on the model grid.
pub struct AlignedModel {
    model: CompiledModel,
    geodict: GeoGrid,
    store: Box<dyn ChunkStore>,
    event: EventInfo,
    shakemap: String,
    numstd: f64,
    uncertainty: bool,
    slope_mask: bool,
    sources: IndexMap<String, PathBuf>,
    load_times: IndexMap<String, Duration>,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl std::fmt::Debug for AlignedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedModel")
            .field("model", &self.model.name)
            .field("geodict", &self.geodict)
            .field("backend", &self.store.backend())
            .field("layers", &self.store.names())
            .field("uncertainty", &self.uncertainty)
            .field("slope_mask", &self.slope_mask)
            .finish()
    }
}

impl AlignedModel {
    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    /// The common model grid.
    pub fn geodict(&self) -> &GeoGrid {
        &self.geodict
    }

    pub fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    pub fn event(&self) -> &EventInfo {
        &self.event
    }

    /// `<shakemap_id>_ver<version>` of the shaking grid.
    pub fn shakemap(&self) -> &str {
        &self.shakemap
    }

    pub fn numstd(&self) -> f64 {
        self.numstd
    }

    /// Whether the min/max variants are evaluated.
    pub fn has_uncertainty(&self) -> bool {
        self.uncertainty
    }

    /// Whether a slope mask was built.
    pub fn has_slope_mask(&self) -> bool {
        self.slope_mask
    }

    /// File each layer was read from (after variant selection).
    pub fn sources(&self) -> &IndexMap<String, PathBuf> {
        &self.sources
    }

    /// Time spent loading each input.
    pub fn load_times(&self) -> &IndexMap<String, Duration> {
        &self.load_times
    }

    /// Cancellation or deadline carried over from the model options.
    pub fn interrupted(&self) -> Option<Interrupt> {
        Interrupt::poll(self.cancel.as_deref(), self.deadline)
    }

    /// Fails once the run is cancelled or past its deadline.
    pub fn check_interrupt(&self, next: &str) -> Result<(), EvaluationError> {
        match self.interrupted() {
            Some(Interrupt::Cancelled) => Err(EvaluationError::Cancelled(next.to_string())),
            Some(Interrupt::DeadlineExceeded) => Err(EvaluationError::DeadlineExceeded(next.to_string())),
            None => Ok(()),
        }
    }

    /// Keep spilled layers after drop; returns their directory.
    pub fn persist(&mut self) -> Option<PathBuf> {
        self.store.persist()
    }

    /// Drop every stored layer now.
    pub fn release(&mut self) -> Result<(), AlignmentError> {
        Ok(self.store.release()?)
    }
}

/// Align `model` to `shake`.
///
/// A missing or incomplete `uncertainty` grid only disables the min/max
/// variants. Layer reads stop early when `options.cancel` is set or
/// `options.deadline` has passed, and the aligned model keeps both for
/// evaluation.
pub fn align(
    model: CompiledModel,
    shake: &ShakeGrid,
    uncertainty: Option<&ShakeGrid>,
    options: &ModelOptions,
) -> Result<AlignedModel, AlignmentError> {
    let start = Instant::now();

    for gm in model.required_shake_fields() {
        if !shake.has_field(gm.as_str()) {
            return Err(AlignmentError::MissingShakeField(gm.as_str().to_string()));
        }
    }

    let target = target_grid(shake.geodict(), options)?;

    let base = model
        .layer(&model.baselayer)
        .ok_or_else(|| AlignmentError::MissingLayer(model.baselayer.clone()))?;
    check_interrupt(options, &base.name)?;
    let base_path = select_variant(base, model.time_field, shake.event.time)?;
    let base_file = open_layer(&base.name, base_path)?;
    let geodict = base_file
        .geodict()
        .bounds_within(&target)
        .map_err(|source| AlignmentError::NoOverlap {
            layer: base.name.clone(),
            source,
        })?;

    info!(
        model = %model.name,
        rows = geodict.ny,
        cols = geodict.nx,
        dx = geodict.dx,
        dy = geodict.dy,
        "Model grid"
    );

    let mut store = open_store(geodict, &options.store)?;
    let mut load_times = IndexMap::new();
    let mut sources = IndexMap::new();

    for gm in model.required_shake_fields() {
        let key = shake_key(gm);
        let loaded = Instant::now();
        let field = shake.layer(gm.as_str()).map_err(AlignmentError::Shaking)?;
        let grid = cut_source(&key, field, &geodict, InterpolationMethod::Linear, options.extra_cells)?;
        store.put(&key, &grid)?;
        load_times.insert(key, loaded.elapsed());
    }

    let has_uncertainty = match uncertainty {
        Some(grid) => load_uncertainty(&model, grid, &geodict, options, store.as_mut(), &mut load_times),
        None => false,
    };

    for spec in model.layers.values() {
        check_interrupt(options, &spec.name)?;
        let loaded = Instant::now();
        let path = select_variant(spec, model.time_field, shake.event.time)?;
        let file = open_layer(&spec.name, path)?;
        let grid = cut_source(&spec.name, &file, &geodict, spec.interpolation, options.extra_cells)?;
        store.put(&spec.name, &grid)?;

        let elapsed = loaded.elapsed();
        info!(
            layer = %spec.name,
            path = %path.display(),
            method = %spec.interpolation,
            elapsed_ms = elapsed.as_millis() as u64,
            "Loaded layer"
        );
        load_times.insert(spec.name.clone(), elapsed);
        sources.insert(spec.name.clone(), path.to_path_buf());
    }

    let slope_mask = build_slope_mask(&model, &geodict, options, store.as_mut())?;

    info!(
        model = %model.name,
        backend = store.backend(),
        uncertainty = has_uncertainty,
        slope_mask,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Aligned model inputs"
    );

    Ok(AlignedModel {
        shakemap: shake.identity(),
        event: shake.event.clone(),
        numstd: options.numstd,
        model,
        geodict,
        store,
        uncertainty: has_uncertainty,
        slope_mask,
        sources,
        load_times,
        cancel: options.cancel.clone(),
        deadline: options.deadline,
    })
}

/// The shaking grid, cut to the user bounds when they lie inside it.
fn target_grid(native: &GeoGrid, options: &ModelOptions) -> Result<GeoGrid, AlignmentError> {
    let Some(bounds) = options.bounds else {
        return Ok(*native);
    };

    let inside = bounds.xmin >= native.xmin
        && bounds.xmax <= native.xmax
        && bounds.ymin >= native.ymin
        && bounds.ymax <= native.ymax;
    if !inside {
        warn!(
            xmin = bounds.xmin,
            xmax = bounds.xmax,
            ymin = bounds.ymin,
            ymax = bounds.ymax,
            "Bounds outside shaking grid, using the full shaking extent"
        );
        return Ok(*native);
    }

    let no_overlap = |source: GeometryError| AlignmentError::NoOverlap {
        layer: "bounds".to_string(),
        source,
    };
    let requested = GeoGrid::from_bbox(&bounds, native.dx, native.dy, Containment::Outside).map_err(no_overlap)?;
    native.bounds_within(&requested).map_err(no_overlap)
}

/// Pick the file of a layer for this event.
pub fn select_variant(
    spec: &LayerSpec,
    time_field: Option<TimeField>,
    event_time: Option<DateTime<Utc>>,
) -> Result<&Path, AlignmentError> {
    match spec.files.as_slice() {
        [only] => Ok(only.as_path()),
        files if time_field == Some(TimeField::Month) => {
            let time = event_time.ok_or_else(|| AlignmentError::MissingEventTime(spec.name.clone()))?;
            let month = time.format("%b").to_string();
            let chosen = files.iter().find(|f| {
                f.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(&month))
            });
            match chosen {
                Some(path) => {
                    debug!(layer = %spec.name, month = %month, path = %path.display(), "Selected time variant");
                    Ok(path.as_path())
                }
                None => Err(AlignmentError::NoMonthVariant {
                    layer: spec.name.clone(),
                    month,
                }),
            }
        }
        files => Err(AlignmentError::UnresolvedVariants {
            layer: spec.name.clone(),
            count: files.len(),
        }),
    }
}

fn open_layer(layer: &str, path: &Path) -> Result<RasterFile, AlignmentError> {
    RasterFile::open(path).map_err(|source| AlignmentError::Raster {
        layer: layer.to_string(),
        source,
    })
}

fn cut_source(
    name: &str,
    source: &dyn RasterSource,
    geodict: &GeoGrid,
    method: InterpolationMethod,
    extra: usize,
) -> Result<Grid2D, AlignmentError> {
    cut_to_grid(source, geodict, method, extra).map_err(|e| match e {
        RasterError::Geometry(source) => AlignmentError::NoOverlap {
            layer: name.to_string(),
            source,
        },
        source => AlignmentError::Raster {
            layer: name.to_string(),
            source,
        },
    })
}

fn check_interrupt(options: &ModelOptions, next: &str) -> Result<(), AlignmentError> {
    match options.interrupted() {
        Some(Interrupt::Cancelled) => Err(AlignmentError::Cancelled(next.to_string())),
        Some(Interrupt::DeadlineExceeded) => Err(AlignmentError::DeadlineExceeded(next.to_string())),
        None => Ok(()),
    }
}

/// Store every needed uncertainty field. Returns false (with a warning) if
/// any is missing or fails to load.
fn load_uncertainty(
    model: &CompiledModel,
    grid: &ShakeGrid,
    geodict: &GeoGrid,
    options: &ModelOptions,
    store: &mut dyn ChunkStore,
    load_times: &mut IndexMap<String, Duration>,
) -> bool {
    for gm in &model.ground_motions {
        let key = uncertainty_key(*gm);
        let loaded = Instant::now();
        let stored = grid
            .layer(gm.uncertainty_field())
            .map_err(|e| e.to_string())
            .and_then(|field| {
                cut_source(&key, field, geodict, InterpolationMethod::Linear, options.extra_cells)
                    .map_err(|e| e.to_string())
            })
            .and_then(|cut| store.put(&key, &cut).map_err(|e| e.to_string()));
        if let Err(error) = stored {
            warn!(field = gm.uncertainty_field(), error = %error, "Ignoring uncertainties");
            return false;
        }
        load_times.insert(key, loaded.elapsed());
    }
    true
}

/// Build and store the slope mask. Returns whether a mask exists.
fn build_slope_mask(
    model: &CompiledModel,
    geodict: &GeoGrid,
    options: &ModelOptions,
    store: &mut dyn ChunkStore,
) -> Result<bool, AlignmentError> {
    let settings = &model.slope;
    let Some(source) = &settings.source else {
        return Ok(false);
    };
    if let SlopeTransform::Invalid(reason) = &settings.transform {
        warn!(reason = %reason, "slopemod could not be used, slope thresholding disabled");
        return Ok(false);
    }

    let raw = match source {
        SlopeSource::Layer(name) => store.read_whole(name)?,
        SlopeSource::File(path) => {
            check_interrupt(options, "slope")?;
            let loaded = RasterFile::open(path).and_then(|file| {
                cut_to_grid(&file, geodict, InterpolationMethod::Linear, options.extra_cells)
            });
            match loaded {
                Ok(grid) => grid,
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Could not read slope file, slope thresholding disabled");
                    return Ok(false);
                }
            }
        }
    };

    let degrees = match &settings.transform {
        SlopeTransform::Expr(expr) => match interp::transform(expr, SLOPE_VARIABLE, raw.data()) {
            Ok(values) => values,
            Err(error) => {
                warn!(error = %error, "slopemod failed, slope thresholding disabled");
                return Ok(false);
            }
        },
        _ => raw.into_data(),
    };

    let (min, max) = (settings.min, settings.max);
    let nx = geodict.nx;
    let mask = Grid2D::from_fn(*geodict, |row, col| {
        let d = degrees[row * nx + col];
        if min < d && d <= max {
            1.0
        } else {
            0.0
        }
    });
    store.put(SLOPE_MASK_KEY, &mask)?;
    debug!(min, max, "Built slope mask");
    Ok(true)
}
