//! Error types for raster reading.

use std::path::{Path, PathBuf};

use gfail_common::GeometryError;
use thiserror::Error;

/// Errors that can occur while reading or resampling rasters.
#[derive(Error, Debug)]
pub enum RasterError {
    /// Failed to read the file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not one of the supported raster formats.
    #[error(
        "unsupported raster format: {0} (expected ESRI ASCII .asc or ESRI binary .flt/.bil with .hdr; GMT and GeoTIFF grids are not read)"
    )]
    UnsupportedFormat(PathBuf),

    /// The raster header is missing a key or has a bad value.
    #[error("invalid raster header in {path}: {message}")]
    InvalidHeader { path: PathBuf, message: String },

    /// The raster body does not match its header.
    #[error("invalid raster data in {path}: {message}")]
    InvalidData { path: PathBuf, message: String },

    /// ShakeMap XML could not be parsed.
    #[error("invalid ShakeMap XML in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    /// A requested ShakeMap field is absent.
    #[error("field '{field}' not present (available: {available})")]
    MissingField { field: String, available: String },

    /// Geometry arithmetic failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl RasterError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn header(path: &Path, message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn data(path: &Path, message: impl Into<String>) -> Self {
        Self::InvalidData {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn xml(path: &Path, message: impl std::fmt::Display) -> Self {
        Self::Xml {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
