//! The logistic ground-failure model: compile, align, evaluate, assemble.

use std::path::Path;
use std::time::Instant;

use raster_io::ShakeGrid;
use tracing::{info, warn};

use crate::aligner::{align, AlignedModel};
use crate::assemble::assemble;
use crate::compiler::{compile, CompiledModel};
use crate::config::ModelDocument;
use crate::error::{AlignmentError, ConfigError, Result};
use crate::evaluator::{evaluate, Probabilities};
use crate::options::{CalculateOptions, ModelOptions};
use crate::postprocess::postprocess;
use crate::result::ModelResult;

/// A compiled model with its inputs aligned, ready to calculate.
#[derive(Debug)]
pub struct LogisticModel {
    aligned: AlignedModel,
    options: ModelOptions,
}

impl LogisticModel {
    /// Compile `doc` and align it to the shaking grid at `shakefile`.
    ///
    /// An unreadable `uncertfile` only disables the min/max variants.
    pub fn new(
        doc: &ModelDocument,
        shakefile: impl AsRef<Path>,
        uncertfile: Option<&Path>,
        options: ModelOptions,
    ) -> Result<Self> {
        options.validate().map_err(ConfigError::InvalidOptions)?;
        let compiled = compile(doc, &options)?;

        let shakefile = shakefile.as_ref();
        let shake = ShakeGrid::load(shakefile).map_err(AlignmentError::Shaking)?;
        let uncertainty = match uncertfile {
            Some(path) => match ShakeGrid::load(path) {
                Ok(grid) => Some(grid),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not read uncertainty file, ignoring uncertainties");
                    None
                }
            },
            None => None,
        };

        Self::from_parts(compiled, &shake, uncertainty.as_ref(), options)
    }

    /// Align an already compiled model to loaded grids.
    pub fn from_parts(
        compiled: CompiledModel,
        shake: &ShakeGrid,
        uncertainty: Option<&ShakeGrid>,
        options: ModelOptions,
    ) -> Result<Self> {
        let aligned = align(compiled, shake, uncertainty, &options)?;
        Ok(Self { aligned, options })
    }

    pub fn compiled(&self) -> &CompiledModel {
        self.aligned.model()
    }

    pub fn aligned(&self) -> &AlignedModel {
        &self.aligned
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// The nominal equation, e.g. `b0 + (b1 * log(shake(pga)))`.
    pub fn equation(&self) -> String {
        self.compiled().equation.to_string()
    }

    /// Whether a slope mask will be applied.
    pub fn slope_thresholding(&self) -> bool {
        self.aligned.has_slope_mask()
    }

    /// Raw probabilities without masks or transforms.
    pub fn evaluate(&self, row_chunk: Option<usize>, col_chunk: Option<usize>) -> Result<Probabilities> {
        Ok(evaluate(&self.aligned, row_chunk, col_chunk)?)
    }

    /// Evaluate, post-process and label the outputs.
    ///
    /// With `cleanup` the aligned layers are released afterwards; otherwise
    /// spilled layers stay on disk and their directory is reported in the
    /// result. A failed or interrupted run never keeps its layers.
    pub fn calculate(mut self, options: &CalculateOptions) -> Result<ModelResult> {
        options.validate().map_err(ConfigError::InvalidOptions)?;
        let start = Instant::now();

        let outcome = self.run(options);

        let retained = match &outcome {
            Ok(_) if !options.cleanup => self.aligned.persist(),
            _ => {
                if let Err(e) = self.aligned.release() {
                    warn!(model = %self.compiled().name, error = %e, "Failed to release aligned layers");
                }
                None
            }
        };

        let mut result = outcome?;
        result.set_retained_store(retained);
        info!(
            model = %self.compiled().name,
            outputs = result.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Model calculated"
        );
        Ok(result)
    }

    fn run(&self, options: &CalculateOptions) -> Result<ModelResult> {
        let mut probs = evaluate(&self.aligned, options.row_chunk, options.col_chunk)?;
        self.aligned.check_interrupt("post-processing")?;
        postprocess(&self.aligned, &mut probs)?;
        self.aligned.check_interrupt("assembly")?;
        let result = assemble(&self.aligned, probs, self.options.save_inputs)?;
        self.aligned.check_interrupt("keeping aligned layers")?;
        Ok(result)
    }
}
