//! YAML model configuration.
//!
//! A document holds exactly one model keyed by its name. Top-level scalar
//! entries (comments, version tags) are ignored.
//!
//! ```yaml
//! nowicki_2015:
//!   gfetype: landslide
//!   baselayer: slope
//!   coefficients: {b0: -3.649, b1: 0.0133}
//!   terms: {b1: "pga * slope"}
//!   layers:
//!     slope: {file: slope.asc, units: degrees}
//!   interpolations: {slope: linear}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::ConfigError;

/// Placeholder for absent reference metadata.
pub const UNKNOWN_REF: &str = "unknown";

/// A number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(v) => Some(*v),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Number(v) => write!(f, "{v}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// One path, or an ordered list of time variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileRef {
    One(String),
    Many(Vec<String>),
}

impl FileRef {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            FileRef::One(p) => vec![p.as_str()],
            FileRef::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub file: FileRef,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub longref: Option<String>,
    #[serde(default)]
    pub shortref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageConfig {
    pub eqn: String,
}

/// The body of one model entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub gfetype: String,
    #[serde(default)]
    pub funcname: Option<String>,
    pub baselayer: String,
    pub coefficients: IndexMap<String, Scalar>,
    #[serde(default)]
    pub terms: IndexMap<String, String>,
    pub layers: IndexMap<String, LayerConfig>,
    #[serde(default)]
    pub interpolations: IndexMap<String, String>,
    #[serde(default)]
    pub slopefile: Option<String>,
    #[serde(default)]
    pub slopemin: Option<Scalar>,
    #[serde(default)]
    pub slopemax: Option<Scalar>,
    #[serde(default)]
    pub slopemod: Option<String>,
    #[serde(default)]
    pub vs30max: Option<Scalar>,
    #[serde(default)]
    pub minpgv: Option<Scalar>,
    #[serde(default)]
    pub coverage: Option<CoverageConfig>,
    #[serde(default)]
    pub longref: Option<String>,
    #[serde(default)]
    pub shortref: Option<String>,
}

/// A named model read from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDocument {
    pub name: String,
    pub config: ModelConfig,
    /// Where the document was read from, if it came from a file.
    pub source: Option<PathBuf>,
}

impl ModelDocument {
    /// Read a model document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut doc = Self::from_yaml_str(&text)?;
        doc.source = Some(path.to_path_buf());
        Ok(doc)
    }

    /// Parse a model document held in memory.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let Value::Mapping(entries) = root else {
            return Err(ConfigError::Parse("top level must be a mapping".to_string()));
        };

        let mut models = Vec::new();
        for (key, value) in entries {
            if !matches!(value, Value::Mapping(_)) {
                continue;
            }
            let name = match key {
                Value::String(s) => s,
                other => serde_yaml::to_string(&other)
                    .map(|s| s.trim().to_string())
                    .map_err(|e| ConfigError::Parse(e.to_string()))?,
            };
            models.push((name, value));
        }

        match models.len() {
            0 => Err(ConfigError::NoModel),
            1 => {
                let (name, value) = models.remove(0);
                let config = serde_yaml::from_value(value).map_err(|e| ConfigError::Parse(format!("{name}: {e}")))?;
                Ok(Self {
                    name,
                    config,
                    source: None,
                })
            }
            _ => Err(ConfigError::MultipleModels(models.into_iter().map(|(n, _)| n).collect())),
        }
    }
}

/// Resolve a configured path against the data directory. Absolute paths and
/// paths without a data directory are used as given.
pub fn resolve_path(raw: &str, data_path: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(raw);
    match data_path {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
version: 2
nowicki_2015:
  gfetype: landslide
  funcname: LogisticModel
  baselayer: slope
  coefficients:
    b0: -3.649
    b1: "0.0133"
  terms:
    b1: pga * slope
  layers:
    slope:
      file: slope.asc
      units: degrees
    precip:
      file: [precip_Jan.asc, precip_Feb.asc]
      units: mm
  interpolations:
    slope: linear
    precip: nearest
  slopemin: 5
  coverage:
    eqn: "P * 0.5"
"#;

    #[test]
    fn test_parse_single_model() {
        let doc = ModelDocument::from_yaml_str(DOC).unwrap();
        assert_eq!(doc.name, "nowicki_2015");
        let config = &doc.config;
        assert_eq!(config.gfetype, "landslide");
        assert_eq!(config.funcname.as_deref(), Some("LogisticModel"));
        assert_eq!(config.coefficients["b0"].to_f64(), Some(-3.649));
        assert_eq!(config.coefficients["b1"].to_f64(), Some(0.0133));
        assert_eq!(config.slopemin.as_ref().and_then(Scalar::to_f64), Some(5.0));
        assert_eq!(config.layers["precip"].file.paths(), vec!["precip_Jan.asc", "precip_Feb.asc"]);
        assert_eq!(config.coverage.as_ref().unwrap().eqn, "P * 0.5");
        assert!(config.slopemax.is_none());
    }

    #[test]
    fn test_multiple_models_rejected() {
        let text = format!("{DOC}\nother:\n  gfetype: liquefaction\n");
        match ModelDocument::from_yaml_str(&text) {
            Err(ConfigError::MultipleModels(names)) => assert_eq!(names, vec!["nowicki_2015", "other"]),
            other => panic!("expected MultipleModels, got {other:?}"),
        }
    }

    #[test]
    fn test_no_model() {
        assert!(matches!(
            ModelDocument::from_yaml_str("version: 1\nnote: hello\n"),
            Err(ConfigError::NoModel)
        ));
        assert!(matches!(ModelDocument::from_yaml_str("- a\n- b\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_required_key() {
        let err = ModelDocument::from_yaml_str("m:\n  gfetype: landslide\n").unwrap_err();
        assert!(err.to_string().contains("m:"), "{err}");
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/data");
        assert_eq!(resolve_path("slope.asc", Some(base)), PathBuf::from("/data/slope.asc"));
        assert_eq!(resolve_path("/abs/slope.asc", Some(base)), PathBuf::from("/abs/slope.asc"));
        assert_eq!(resolve_path("slope.asc", None), PathBuf::from("slope.asc"));
    }
}
