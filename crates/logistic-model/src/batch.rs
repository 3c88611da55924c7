//! Validating several model configurations without stopping at the first
//! bad one.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::compiler::{compile, CompiledModel};
use crate::config::ModelDocument;
use crate::error::ConfigError;
use crate::options::ModelOptions;

/// One configuration that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a batch, in input order.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport<T> {
    pub succeeded: Vec<(PathBuf, T)>,
    pub failed: Vec<BatchFailure>,
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// File the outcome of one configuration.
    pub fn record<E: std::fmt::Display>(&mut self, path: &Path, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => self.succeeded.push((path.to_path_buf(), value)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Model configuration failed");
                self.failed.push(BatchFailure {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_paths(&self) -> impl Iterator<Item = &Path> {
        self.failed.iter().map(|f| f.path.as_path())
    }
}

/// Load and compile every file in `paths`, collecting failures.
pub fn validate_configs<P: AsRef<Path>>(paths: &[P], options: &ModelOptions) -> BatchReport<CompiledModel> {
    let mut report = BatchReport::new();
    for path in paths {
        let path = path.as_ref();
        let outcome = ModelDocument::load(path).and_then(|doc| compile(&doc, options));
        report.record::<ConfigError>(path, outcome);
    }
    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Validated model configurations"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_order() {
        let mut report = BatchReport::<u32>::new();
        report.record(Path::new("a.yml"), Ok::<_, String>(1));
        report.record(Path::new("b.yml"), Err::<u32, _>("bad".to_string()));
        report.record(Path::new("c.yml"), Ok::<_, String>(3));

        assert!(!report.is_success());
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.succeeded[1], (PathBuf::from("c.yml"), 3));
        assert_eq!(report.failed_paths().collect::<Vec<_>>(), vec![Path::new("b.yml")]);
        assert_eq!(report.failed[0].error, "bad");
    }
}
