//! Window-readable raster sources.

use std::path::{Path, PathBuf};

use gfail_common::{GeoGrid, Grid2D};

use crate::error::{RasterError, Result};
use crate::format::{detect, FileKind, RasterFormat};
use crate::window::Window;
use crate::{esri_ascii, esri_float};

/// Anything that knows its native grid and can hand out a window of it.
pub trait RasterSource {
    /// The native sampling grid.
    fn geodict(&self) -> &GeoGrid;

    /// Read a block of rows and columns.
    fn read_window(&self, window: &Window) -> Result<Grid2D>;

    /// Short name for logs and errors.
    fn describe(&self) -> String;
}

/// A raster file on disk whose header has been read.
#[derive(Debug, Clone)]
pub struct RasterFile {
    path: PathBuf,
    format: RasterFormat,
    geodict: GeoGrid,
}

impl RasterFile {
    /// Detect the format and read the header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = match detect(path) {
            FileKind::Raster(format) => format,
            FileKind::Directory | FileKind::Unknown => {
                return Err(RasterError::UnsupportedFormat(path.to_path_buf()));
            }
        };
        let geodict = match format {
            RasterFormat::EsriAscii => esri_ascii::read_header(path)?.geodict,
            RasterFormat::EsriFloat => esri_float::read_header(path)?.geodict,
        };
        Ok(Self {
            path: path.to_path_buf(),
            format,
            geodict,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }

    /// Read every cell.
    pub fn read_all(&self) -> Result<Grid2D> {
        self.read_window(&Window::full(&self.geodict))
    }
}

impl RasterSource for RasterFile {
    fn geodict(&self) -> &GeoGrid {
        &self.geodict
    }

    fn read_window(&self, window: &Window) -> Result<Grid2D> {
        match self.format {
            RasterFormat::EsriAscii => esri_ascii::read_window(&self.path, window),
            RasterFormat::EsriFloat => esri_float::read_window(&self.path, window),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl RasterSource for Grid2D {
    fn geodict(&self) -> &GeoGrid {
        Grid2D::geodict(self)
    }

    fn read_window(&self, window: &Window) -> Result<Grid2D> {
        Ok(self.subset(window.row_start, window.row_end, window.col_start, window.col_end)?)
    }

    fn describe(&self) -> String {
        format!("in-memory grid {}", Grid2D::geodict(self))
    }
}
