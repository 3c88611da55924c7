//! Engine options.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gfail_common::BoundingBox;
use grid_store::StoreConfig;

/// Why a model run stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl Interrupt {
    /// The first interrupt that applies now, cancellation first.
    pub fn poll(cancel: Option<&AtomicBool>, deadline: Option<Instant>) -> Option<Self> {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Some(Self::Cancelled);
        }
        match deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Self::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Options fixed when a model is built.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    /// Standard deviations of ground motion for the min/max variants.
    pub numstd: f64,

    /// Echo aligned inputs into the result.
    pub save_inputs: bool,

    /// Restrict the model to this box (ignored if it leaves the shaking grid).
    pub bounds: Option<BoundingBox>,

    /// Overrides the configured slope file.
    pub slopefile: Option<String>,

    /// Overrides the configured slope transform.
    pub slopemod: Option<String>,

    /// Base directory for relative layer paths.
    pub data_path: Option<PathBuf>,

    /// Cells read beyond the model grid on each side before resampling.
    pub extra_cells: usize,

    /// Where aligned layers are kept.
    pub store: StoreConfig,

    /// Set to abandon the model at the next layer load or tile.
    pub cancel: Option<Arc<AtomicBool>>,

    /// The model fails at the first layer load or tile started after this
    /// instant.
    pub deadline: Option<Instant>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            numstd: 1.0,
            save_inputs: false,
            bounds: None,
            slopefile: None,
            slopemod: None,
            data_path: None,
            extra_cells: 5,
            store: StoreConfig::default(),
            cancel: None,
            deadline: None,
        }
    }
}

impl ModelOptions {
    pub fn interrupted(&self) -> Option<Interrupt> {
        Interrupt::poll(self.cancel.as_deref(), self.deadline)
    }

    /// Load options from environment variables.
    pub fn from_env() -> Self {
        let mut options = Self {
            store: StoreConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("GFAIL_NUMSTD") {
            if let Ok(numstd) = val.parse() {
                options.numstd = numstd;
            }
        }

        if let Ok(val) = std::env::var("GFAIL_DATA_PATH") {
            if !val.is_empty() {
                options.data_path = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("GFAIL_EXTRA_CELLS") {
            if let Ok(cells) = val.parse() {
                options.extra_cells = cells;
            }
        }

        options
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<(), String> {
        if !self.numstd.is_finite() || self.numstd < 0.0 {
            return Err(format!("numstd must be a non-negative number, got {}", self.numstd));
        }

        if let Some(bounds) = &self.bounds {
            if !bounds.is_valid() {
                return Err(format!(
                    "invalid bounds ({}, {}, {}, {})",
                    bounds.xmin, bounds.xmax, bounds.ymin, bounds.ymax
                ));
            }
        }

        if let Some(dir) = &self.data_path {
            if !dir.is_dir() {
                return Err(format!("data_path {} is not a directory", dir.display()));
            }
        }

        self.store.validate()
    }
}

/// Options for one `calculate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculateOptions {
    /// Rows per tile (`None`: one tile in height).
    pub row_chunk: Option<usize>,

    /// Columns per tile (`None`: one tile in width).
    pub col_chunk: Option<usize>,

    /// Remove spilled layers when done.
    pub cleanup: bool,
}

impl Default for CalculateOptions {
    fn default() -> Self {
        Self {
            row_chunk: Some(300),
            col_chunk: None,
            cleanup: true,
        }
    }
}

impl CalculateOptions {
    /// Load options from environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(val) = std::env::var("GFAIL_ROW_CHUNK") {
            if let Ok(rows) = val.parse() {
                options.row_chunk = Some(rows);
            }
        }

        if let Ok(val) = std::env::var("GFAIL_COL_CHUNK") {
            if let Ok(cols) = val.parse() {
                options.col_chunk = Some(cols);
            }
        }

        options
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<(), String> {
        if self.row_chunk == Some(0) {
            return Err("row_chunk must be > 0".to_string());
        }
        if self.col_chunk == Some(0) {
            return Err("col_chunk must be > 0".to_string());
        }
        Ok(())
    }
}
