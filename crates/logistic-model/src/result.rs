//! The labeled grids returned by a model run.

use std::path::PathBuf;

use gfail_common::Grid2D;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Whether a grid is a model output or an echoed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Input,
    Output,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Model settings recorded with each output grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub slopemin: f64,
    pub slopemax: f64,
    pub modeltype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// Short reference of the model or layer.
    pub name: String,
    pub longref: String,
    pub units: String,
    /// `<shakemap_id>_ver<version>`.
    pub shakemap: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ModelParameters>,
}

/// One named grid with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOutput {
    pub grid: Grid2D,
    pub label: String,
    pub kind: LayerKind,
    pub description: Description,
}

/// Output grids in insertion order: `model`, then `modelmin`/`modelmax`,
/// then echoed inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResult {
    layers: IndexMap<String, LayerOutput>,
    retained_store: Option<PathBuf>,
}

impl ModelResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grid unless the key is already taken. Returns whether it was added.
    pub fn insert(&mut self, key: impl Into<String>, layer: LayerOutput) -> bool {
        let key = key.into();
        if self.layers.contains_key(&key) {
            return false;
        }
        self.layers.insert(key, layer);
        true
    }

    pub fn get(&self, key: &str) -> Option<&LayerOutput> {
        self.layers.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.layers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerOutput)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn into_layers(self) -> IndexMap<String, LayerOutput> {
        self.layers
    }

    /// Directory of spilled layers kept after the run (`cleanup = false`).
    pub fn retained_store(&self) -> Option<&PathBuf> {
        self.retained_store.as_ref()
    }

    pub(crate) fn set_retained_store(&mut self, path: Option<PathBuf>) {
        self.retained_store = path;
    }
}

/// Python-style `str.capitalize`.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Capitalize every whitespace-separated word.
pub(crate) fn title_case(s: &str) -> String {
    s.split_whitespace().map(capitalize).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfail_common::GeoGrid;

    fn layer(label: &str) -> LayerOutput {
        LayerOutput {
            grid: Grid2D::filled(GeoGrid::from_corner(0.0, 1.0, 1.0, 1.0, 2, 2).unwrap(), 0.5),
            label: label.to_string(),
            kind: LayerKind::Output,
            description: Description {
                name: "Test".to_string(),
                longref: "unknown".to_string(),
                units: "probability".to_string(),
                shakemap: "us1_ver1".to_string(),
                parameters: None,
            },
        }
    }

    #[test]
    fn test_insert_keeps_first() {
        let mut result = ModelResult::new();
        assert!(result.insert("model", layer("first")));
        assert!(!result.insert("model", layer("second")));
        assert!(result.insert("slope", layer("slope")));
        assert_eq!(result.get("model").unwrap().label, "first");
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["model", "slope"]);
    }

    #[test]
    fn test_label_casing() {
        assert_eq!(capitalize("LANDSLIDE"), "Landslide");
        assert_eq!(title_case("relative hazard"), "Relative Hazard");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_description_serialization() {
        let json = serde_json::to_value(&layer("x").description).unwrap();
        assert_eq!(json["units"], "probability");
        assert!(json.get("parameters").is_none());
        assert_eq!(serde_json::to_value(LayerKind::Input).unwrap(), "input");
    }
}
