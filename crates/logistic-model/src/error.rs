//! Error types for model construction and evaluation.

use std::path::PathBuf;

use gfail_common::GeometryError;
use grid_store::StoreError;
use raster_io::RasterError;
use thiserror::Error;

use crate::options::Interrupt;

/// A malformed or contradictory model definition. Fatal at construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document could not be read.
    #[error("failed to read model config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML or does not have the model shape.
    #[error("invalid model config: {0}")]
    Parse(String),

    #[error("no model found in configuration")]
    NoModel,

    #[error("more than one model in configuration: {}", .0.join(", "))]
    MultipleModels(Vec<String>),

    #[error("missing intercept (b0)")]
    MissingIntercept,

    #[error("invalid coefficient name: {0}")]
    InvalidCoefficientName(String),

    #[error("invalid coefficient value for {name}: {value}")]
    InvalidCoefficientValue { name: String, value: String },

    #[error("term without matching coefficient: {0}")]
    TermWithoutCoefficient(String),

    #[error("unknown term fragment: {residue} (in {coefficient})")]
    UnknownTermFragment { coefficient: String, residue: String },

    #[error("invalid expression for {context}: {message}")]
    InvalidExpression { context: String, message: String },

    #[error("unsupported layer format for '{layer}': {path}")]
    UnsupportedLayerFormat { layer: String, path: PathBuf },

    #[error("no raster files for layer '{layer}' in {path}")]
    EmptyLayer { layer: String, path: PathBuf },

    #[error("invalid interpolation '{method}' for layer '{layer}'")]
    InvalidInterpolation { layer: String, method: String },

    #[error("missing interpolation for layer '{0}'")]
    MissingInterpolation(String),

    #[error("interpolation given for unknown layer '{0}'")]
    InterpolationForUnknownLayer(String),

    #[error("missing units for layer '{0}'")]
    MissingUnits(String),

    #[error("base layer '{0}' is not a configured layer")]
    UnknownBaseLayer(String),

    #[error("vs30max is set but no 'vs30' layer is configured")]
    Vs30WithoutLayer,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl ConfigError {
    pub(crate) fn expression(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidExpression {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

/// A required input could not be brought onto the model grid.
#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("failed to read layer '{layer}': {source}")]
    Raster {
        layer: String,
        #[source]
        source: RasterError,
    },

    #[error("failed to read shaking grid: {0}")]
    Shaking(#[source] RasterError),

    #[error("no overlap while aligning '{layer}': {source}")]
    NoOverlap {
        layer: String,
        #[source]
        source: GeometryError,
    },

    #[error("no variant of layer '{layer}' matches {month}")]
    NoMonthVariant { layer: String, month: String },

    #[error("layer '{layer}' has {count} variants but the model has no MONTH dependency")]
    UnresolvedVariants { layer: String, count: usize },

    #[error("layer '{0}' has time variants but the event time is unknown")]
    MissingEventTime(String),

    #[error("layer '{0}' is not part of the model")]
    MissingLayer(String),

    #[error("shaking grid has no '{0}' field")]
    MissingShakeField(String),

    #[error("layer storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("alignment cancelled before loading '{0}'")]
    Cancelled(String),

    #[error("alignment deadline passed before loading '{0}'")]
    DeadlineExceeded(String),
}

/// A compiled expression could not be evaluated.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("failed to read '{name}' for tile: {source}")]
    Slice {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The expression reads something this scope does not provide.
    #[error("'{0}' is not available here")]
    Unbound(String),

    #[error("operands of length {left} and {right} do not match")]
    LengthMismatch { left: usize, right: usize },

    #[error("invalid tile plan: {0}")]
    Tiles(#[source] StoreError),

    #[error("evaluation cancelled before {0}")]
    Cancelled(String),

    #[error("evaluation deadline passed before {0}")]
    DeadlineExceeded(String),
}

/// Any failure while building or running a model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ModelError {
    /// Whether the run stopped on cancellation or its deadline.
    pub fn interruption(&self) -> Option<Interrupt> {
        match self {
            Self::Alignment(AlignmentError::Cancelled(_)) | Self::Evaluation(EvaluationError::Cancelled(_)) => {
                Some(Interrupt::Cancelled)
            }
            Self::Alignment(AlignmentError::DeadlineExceeded(_))
            | Self::Evaluation(EvaluationError::DeadlineExceeded(_)) => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
