//! Runner configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gfail_common::BoundingBox;
use grid_store::{StoreBackend, StoreConfig};
use logistic_model::{CalculateOptions, ModelOptions};

/// Restrict the run to where a shaking field exceeds a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Zoom {
    pub field: String,
    pub threshold: f64,
}

impl FromStr for Zoom {
    type Err = String;

    /// Parse `field,threshold`, e.g. `pga,2.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, threshold) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'field,threshold', got '{s}'"))?;
        let field = field.trim().to_lowercase();
        if field.is_empty() {
            return Err(format!("missing field name in '{s}'"));
        }
        let threshold = threshold
            .trim()
            .parse()
            .map_err(|_| format!("invalid threshold in '{s}'"))?;
        Ok(Self { field, threshold })
    }
}

/// How the model area is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum Area {
    /// The whole shaking grid.
    Full,
    Bounds(BoundingBox),
    Zoom(Zoom),
}

/// Everything one runner invocation needs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub configs: Vec<PathBuf>,
    pub shakefile: PathBuf,
    pub uncertfile: Option<PathBuf>,
    pub numstd: f64,
    pub area: Area,
    pub save_inputs: bool,
    pub data_path: Option<PathBuf>,
    pub store: StoreConfig,
    pub keep_temp: bool,
    pub row_chunk: Option<usize>,
    pub col_chunk: Option<usize>,
    /// Per-model limit.
    pub timeout: Option<Duration>,
    /// Only compile the configurations.
    pub check_only: bool,
    /// Summary destination (stdout if unset).
    pub output: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            configs: Vec::new(),
            shakefile: PathBuf::from("grid.xml"),
            uncertfile: None,
            numstd: 1.0,
            area: Area::Full,
            save_inputs: false,
            data_path: None,
            store: StoreConfig::default(),
            keep_temp: false,
            row_chunk: CalculateOptions::default().row_chunk,
            col_chunk: None,
            timeout: None,
            check_only: false,
            output: None,
        }
    }
}

impl RunnerConfig {
    /// Engine options for one model.
    pub fn model_options(&self, bounds: Option<BoundingBox>) -> ModelOptions {
        ModelOptions {
            numstd: self.numstd,
            save_inputs: self.save_inputs,
            bounds,
            data_path: self.data_path.clone(),
            store: self.store.clone(),
            ..ModelOptions::default()
        }
    }

    pub fn calculate_options(&self) -> CalculateOptions {
        CalculateOptions {
            row_chunk: self.row_chunk,
            col_chunk: self.col_chunk,
            cleanup: !self.keep_temp,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.configs.is_empty() {
            return Err("at least one model configuration is required".to_string());
        }

        if !self.check_only && !self.shakefile.is_file() {
            return Err(format!("shakefile {} does not exist", self.shakefile.display()));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err("timeout must be positive".to_string());
        }

        if let Area::Bounds(bounds) = &self.area {
            if !bounds.is_valid() {
                return Err(format!(
                    "invalid bounds ({}, {}, {}, {})",
                    bounds.xmin, bounds.xmax, bounds.ymin, bounds.ymax
                ));
            }
        }

        if self.store.backend == StoreBackend::Memory && self.keep_temp {
            return Err("--keep-temp needs the spill store".to_string());
        }

        self.model_options(None).validate()?;
        self.calculate_options().validate()
    }
}
