//! Raster input for the ground-failure models.
//!
//! Predictor layers come as ESRI ASCII grids or ESRI binary grids; shaking
//! and its uncertainty come as ShakeMap XML documents. Every source is read
//! through a [`RasterSource`] so that only the window around the model grid
//! is touched, then brought onto that grid by [`cut_to_grid`].

pub mod error;
pub mod esri_ascii;
pub mod esri_float;
pub mod format;
pub mod resample;
pub mod shakemap;
pub mod source;
pub mod window;

pub use error::{RasterError, Result};
pub use format::{detect, expand, grid_files_in, FileKind, RasterFormat};
pub use resample::resample;
pub use shakemap::{EventInfo, ShakeGrid};
pub use source::{RasterFile, RasterSource};
pub use window::{cut_to_grid, Window};
