//! Logistic ground-failure models driven by shaking grids.
//!
//! A model is described by one YAML document: coefficients, term
//! expressions over named predictor rasters and ground motion, and optional
//! slope, vs30, PGV and coverage rules. Running it goes through four stages:
//!
//! 1. [`compile`]: validate the document and parse each term into an [`Expr`]
//! 2. [`align`]: bring every raster onto one grid inside a [`grid_store::ChunkStore`]
//! 3. [`evaluate`]: compute probabilities tile by tile, including the
//!    perturbed ground-motion variants when uncertainty is available
//! 4. [`postprocess`] and [`assemble`]: masks, transforms and labeled outputs
//!
//! [`LogisticModel`] runs the whole sequence.
//!
//! ```no_run
//! use logistic_model::{CalculateOptions, LogisticModel, ModelDocument, ModelOptions};
//!
//! # fn main() -> logistic_model::Result<()> {
//! let doc = ModelDocument::load("configs/nowicki_2014_global.yml")?;
//! let model = LogisticModel::new(&doc, "grid.xml", None, ModelOptions::default())?;
//! println!("{}", model.equation());
//! let result = model.calculate(&CalculateOptions::default())?;
//! for (key, layer) in result.iter() {
//!     println!("{key}: {}", layer.label);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aligner;
pub mod assemble;
pub mod batch;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod interp;
pub mod model;
pub mod options;
pub mod postprocess;
pub mod result;

pub use aligner::{align, select_variant, AlignedModel};
pub use assemble::{assemble, model_units};
pub use batch::{validate_configs, BatchFailure, BatchReport};
pub use compiler::{compile, CompiledModel, CompiledTerm, Equation, LayerSpec, SlopeSettings, SlopeSource, SlopeTransform};
pub use config::{ModelConfig, ModelDocument};
pub use error::{AlignmentError, ConfigError, EvaluationError, ModelError, Result};
pub use evaluator::{evaluate, logistic, Probabilities};
pub use expr::{Expr, GroundMotion, Perturbation, TimeField};
pub use model::LogisticModel;
pub use options::{CalculateOptions, Interrupt, ModelOptions};
pub use postprocess::postprocess;
pub use result::{Description, LayerKind, LayerOutput, ModelParameters, ModelResult};
