//! Raster format detection and directory expansion.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{RasterError, Result};
use crate::{esri_ascii, esri_float};

/// Supported predictor raster formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// ESRI ASCII grid (`.asc`).
    EsriAscii,
    /// ESRI binary grid (`.flt` or `.bil` with an `.hdr` sidecar).
    EsriFloat,
}

/// What a layer file reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Raster(RasterFormat),
    Directory,
    Unknown,
}

impl RasterFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EsriAscii => "esri-ascii",
            Self::EsriFloat => "esri-float",
        }
    }
}

/// Classify a path. The header is parsed, so a file with the right extension
/// but a broken header is [`FileKind::Unknown`].
pub fn detect(path: &Path) -> FileKind {
    if path.is_dir() {
        return FileKind::Directory;
    }
    if !path.is_file() {
        return FileKind::Unknown;
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("asc") if esri_ascii::read_header(path).is_ok() => FileKind::Raster(RasterFormat::EsriAscii),
        Some("flt") | Some("bil") if esri_float::read_header(path).is_ok() => {
            FileKind::Raster(RasterFormat::EsriFloat)
        }
        _ => FileKind::Unknown,
    }
}

/// Every recognized raster directly inside `dir`, sorted by path.
pub fn grid_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            RasterError::io(dir, source)
        })?;
        let path = entry.path();
        if matches!(detect(path), FileKind::Raster(_)) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Expand one file reference into raster paths: a raster is itself, a
/// directory is its recognized contents.
pub fn expand(path: &Path) -> Result<Vec<PathBuf>> {
    match detect(path) {
        FileKind::Raster(_) => Ok(vec![path.to_path_buf()]),
        FileKind::Directory => grid_files_in(path),
        FileKind::Unknown => Err(RasterError::UnsupportedFormat(path.to_path_buf())),
    }
}
