//! Validation and compilation of a model document.
//!
//! [`compile`] checks coefficients, layers, interpolations, units and
//! references, parses every term and the optional transforms, and produces a
//! [`CompiledModel`] whose [`Equation`] is evaluated tile by tile.

use std::fmt;
use std::path::PathBuf;

use gfail_common::InterpolationMethod;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::{resolve_path, ModelConfig, ModelDocument, Scalar, UNKNOWN_REF};
use crate::error::ConfigError;
use crate::expr::{self, Expr, Grammar, GroundMotion, ParseError, Perturbation, TimeField};
use crate::options::ModelOptions;

/// Name of the input variable in `slopemod`.
pub const SLOPE_VARIABLE: &str = "slope";

/// Name of the input variable in `coverage.eqn`.
pub const PROBABILITY_VARIABLE: &str = "P";

/// Layer whose values are compared against `vs30max`.
pub const VS30_LAYER: &str = "vs30";

/// One coefficient times one compiled term.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTerm {
    /// Coefficient id, e.g. `b3`.
    pub coefficient: String,
    pub index: u32,
    pub weight: f64,
    /// The term as configured.
    pub source: String,
    pub expr: Expr,
    pub time_field: Option<TimeField>,
}

/// `b0 + (b1 * term1) + ...`, in ascending coefficient index.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub intercept: f64,
    pub terms: Vec<CompiledTerm>,
}

impl Equation {
    /// The same equation with every shaking accessor perturbed.
    pub fn perturbed(&self, direction: Perturbation) -> Equation {
        Equation {
            intercept: self.intercept,
            terms: self
                .terms
                .iter()
                .map(|t| CompiledTerm {
                    expr: t.expr.perturbed(direction),
                    ..t.clone()
                })
                .collect(),
        }
    }

    /// Shaking fields read, in term order.
    pub fn ground_motions(&self) -> Vec<GroundMotion> {
        let mut found = Vec::new();
        for term in &self.terms {
            for gm in term.expr.ground_motions() {
                if !found.contains(&gm) {
                    found.push(gm);
                }
            }
        }
        found
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("b0")?;
        for term in &self.terms {
            write!(f, " + ({} * {})", term.coefficient, term.expr)?;
        }
        Ok(())
    }
}

/// A predictor layer with its files resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub name: String,
    /// One file, or time variants in configured (or sorted directory) order.
    pub files: Vec<PathBuf>,
    pub interpolation: InterpolationMethod,
    pub units: String,
    pub longref: String,
    pub shortref: String,
}

/// Where slope values for the mask come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SlopeSource {
    /// One of the model's layers.
    Layer(String),
    /// A raster read only for the mask.
    File(PathBuf),
}

/// How raw slope values become degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum SlopeTransform {
    Identity,
    Expr(Expr),
    /// The configured transform did not parse; no mask is built.
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlopeSettings {
    pub source: Option<SlopeSource>,
    pub min: f64,
    pub max: f64,
    pub transform: SlopeTransform,
}

impl SlopeSettings {
    /// Whether a mask can be built.
    pub fn enabled(&self) -> bool {
        self.source.is_some() && !matches!(self.transform, SlopeTransform::Invalid(_))
    }
}

/// A validated model ready to be aligned and evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModel {
    pub name: String,
    pub gfetype: String,
    pub funcname: Option<String>,
    pub baselayer: String,
    pub equation: Equation,
    pub layers: IndexMap<String, LayerSpec>,
    pub slope: SlopeSettings,
    pub vs30max: Option<f64>,
    pub minpgv: Option<f64>,
    /// Transform of `P`.
    pub coverage: Option<Expr>,
    pub longref: String,
    pub shortref: String,
    /// The last time field found across all terms.
    pub time_field: Option<TimeField>,
    /// Shaking fields used by the terms, in term order.
    pub ground_motions: Vec<GroundMotion>,
}

impl CompiledModel {
    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.get(name)
    }

    /// Shaking fields that must be present in the shaking grid.
    pub fn required_shake_fields(&self) -> Vec<GroundMotion> {
        let mut fields = self.ground_motions.clone();
        if self.minpgv.is_some() && !fields.contains(&GroundMotion::Pgv) {
            fields.push(GroundMotion::Pgv);
        }
        fields
    }
}

/// Validate and compile a model document.
pub fn compile(doc: &ModelDocument, options: &ModelOptions) -> Result<CompiledModel, ConfigError> {
    let config = &doc.config;

    let coefficients = validate_coefficients(config)?;
    let layers = validate_layers(config, options)?;

    if !layers.contains_key(&config.baselayer) {
        return Err(ConfigError::UnknownBaseLayer(config.baselayer.clone()));
    }

    let layer_names: Vec<String> = layers.keys().cloned().collect();
    let equation = compile_terms(config, &coefficients, &layer_names)?;

    let time_field = equation.terms.iter().filter_map(|t| t.time_field).last();
    let ground_motions = equation.ground_motions();

    let slope = slope_settings(config, options, &layers)?;

    let vs30max = optional_number(&config.vs30max, "vs30max")?;
    if vs30max.is_some() && !layers.contains_key(VS30_LAYER) {
        return Err(ConfigError::Vs30WithoutLayer);
    }
    let minpgv = optional_number(&config.minpgv, "minpgv")?;

    let coverage = match &config.coverage {
        Some(coverage) => Some(
            expr::parse(
                &coverage.eqn,
                Grammar::Transform {
                    variable: PROBABILITY_VARIABLE,
                },
            )
            .map_err(|e| ConfigError::expression("coverage", e))?
            .expr,
        ),
        None => None,
    };

    let longref = reference(&config.longref, "longref", &doc.name);
    let shortref = reference(&config.shortref, "shortref", &doc.name);

    let compiled = CompiledModel {
        name: doc.name.clone(),
        gfetype: config.gfetype.clone(),
        funcname: config.funcname.clone(),
        baselayer: config.baselayer.clone(),
        equation,
        layers,
        slope,
        vs30max,
        minpgv,
        coverage,
        longref,
        shortref,
        time_field,
        ground_motions,
    };

    debug!(
        model = %compiled.name,
        equation = %compiled.equation,
        time_field = ?compiled.time_field,
        "Compiled model"
    );
    Ok(compiled)
}

/// Parse every coefficient, keyed by numeric index.
fn validate_coefficients(config: &ModelConfig) -> Result<IndexMap<u32, (String, f64)>, ConfigError> {
    let mut parsed = Vec::with_capacity(config.coefficients.len());
    for (name, value) in &config.coefficients {
        let index = coefficient_index(name).ok_or_else(|| ConfigError::InvalidCoefficientName(name.clone()))?;
        let weight = value.to_f64().ok_or_else(|| ConfigError::InvalidCoefficientValue {
            name: name.clone(),
            value: value.to_string(),
        })?;
        parsed.push((index, (name.clone(), weight)));
    }
    if !parsed.iter().any(|(index, _)| *index == 0) {
        return Err(ConfigError::MissingIntercept);
    }
    parsed.sort_by_key(|(index, _)| *index);
    Ok(parsed.into_iter().collect())
}

/// Index of a `b<digits>` id.
fn coefficient_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('b')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn validate_layers(config: &ModelConfig, options: &ModelOptions) -> Result<IndexMap<String, LayerSpec>, ConfigError> {
    for name in config.interpolations.keys() {
        if !config.layers.contains_key(name) {
            return Err(ConfigError::InterpolationForUnknownLayer(name.clone()));
        }
    }

    let mut layers = IndexMap::with_capacity(config.layers.len());
    for (name, layer) in &config.layers {
        let mut files = Vec::new();
        for raw in layer.file.paths() {
            let path = resolve_path(raw, options.data_path.as_deref());
            match raster_io::expand(&path) {
                Ok(found) if found.is_empty() => {
                    return Err(ConfigError::EmptyLayer {
                        layer: name.clone(),
                        path,
                    });
                }
                Ok(found) => files.extend(found),
                Err(e) => {
                    debug!(layer = %name, error = %e, "Layer file not usable");
                    return Err(ConfigError::UnsupportedLayerFormat {
                        layer: name.clone(),
                        path,
                    });
                }
            }
        }

        let method = config
            .interpolations
            .get(name)
            .ok_or_else(|| ConfigError::MissingInterpolation(name.clone()))?;
        let interpolation = method
            .parse::<InterpolationMethod>()
            .map_err(|_| ConfigError::InvalidInterpolation {
                layer: name.clone(),
                method: method.clone(),
            })?;

        let units = layer
            .units
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingUnits(name.clone()))?;

        let longref = reference(&layer.longref, "longref", name);
        let shortref = reference(&layer.shortref, "shortref", name);

        layers.insert(
            name.clone(),
            LayerSpec {
                name: name.clone(),
                files,
                interpolation,
                units,
                longref,
                shortref,
            },
        );
    }
    Ok(layers)
}

fn compile_terms(
    config: &ModelConfig,
    coefficients: &IndexMap<u32, (String, f64)>,
    layer_names: &[String],
) -> Result<Equation, ConfigError> {
    for id in config.terms.keys() {
        if !config.coefficients.contains_key(id) {
            return Err(ConfigError::TermWithoutCoefficient(id.clone()));
        }
    }

    let intercept = coefficients.get(&0).map(|(_, w)| *w).ok_or(ConfigError::MissingIntercept)?;

    let mut terms = Vec::new();
    for (index, (name, weight)) in coefficients {
        if *index == 0 {
            continue;
        }
        let Some(source) = config.terms.get(name) else {
            debug!(coefficient = %name, "Coefficient has no term, ignoring");
            continue;
        };
        let parsed = expr::parse(source, Grammar::Term { layers: layer_names }).map_err(|e| match e {
            ParseError::Unknown(residue) => ConfigError::UnknownTermFragment {
                coefficient: name.clone(),
                residue,
            },
            ParseError::Syntax(message) => ConfigError::expression(name.clone(), message),
        })?;
        terms.push(CompiledTerm {
            coefficient: name.clone(),
            index: *index,
            weight: *weight,
            source: source.clone(),
            expr: parsed.expr,
            time_field: parsed.time_field,
        });
    }

    Ok(Equation { intercept, terms })
}

fn slope_settings(
    config: &ModelConfig,
    options: &ModelOptions,
    layers: &IndexMap<String, LayerSpec>,
) -> Result<SlopeSettings, ConfigError> {
    let min = optional_number(&config.slopemin, "slopemin")?.unwrap_or(0.0);
    let max = optional_number(&config.slopemax, "slopemax")?.unwrap_or(90.0);

    let configured = options.slopefile.as_ref().or(config.slopefile.as_ref());
    let source = match configured {
        None => {
            warn!("No slope file configured, slope thresholding disabled");
            None
        }
        Some(raw) if layers.contains_key(raw) => Some(SlopeSource::Layer(raw.clone())),
        Some(raw) => {
            let path = resolve_path(raw, options.data_path.as_deref());
            match layers.values().find(|l| l.files.len() == 1 && l.files[0] == path) {
                Some(layer) => Some(SlopeSource::Layer(layer.name.clone())),
                None => Some(SlopeSource::File(path)),
            }
        }
    };

    let transform = match options.slopemod.as_ref().or(config.slopemod.as_ref()) {
        None => SlopeTransform::Identity,
        Some(raw) => match expr::parse(
            raw,
            Grammar::Transform {
                variable: SLOPE_VARIABLE,
            },
        ) {
            Ok(parsed) => SlopeTransform::Expr(parsed.expr),
            Err(e) => {
                warn!(slopemod = %raw, error = %e, "Invalid slopemod, slope thresholding disabled");
                SlopeTransform::Invalid(e.to_string())
            }
        },
    };

    Ok(SlopeSettings {
        source,
        min,
        max,
        transform,
    })
}

fn optional_number(value: &Option<Scalar>, key: &str) -> Result<Option<f64>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) => v.to_f64().map(Some).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v.to_string(),
        }),
    }
}

fn reference(value: &Option<String>, key: &str, owner: &str) -> String {
    match value {
        Some(v) => v.clone(),
        None => {
            warn!(owner, key, "Reference missing, using '{}'", UNKNOWN_REF);
            UNKNOWN_REF.to_string()
        }
    }
}
