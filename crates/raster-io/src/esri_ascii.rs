//! ESRI ASCII grid reader.
//!
//! ```text
//! ncols         4
//! nrows         3
//! xllcorner     -120.0
//! yllcorner     35.0
//! cellsize      0.5
//! NODATA_value  -9999
//! 1 2 3 4
//! ...
//! ```
//!
//! `xllcenter`/`yllcenter` and separate `dx`/`dy` are accepted too. Nodata
//! cells are returned as NaN.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use gfail_common::{GeoGrid, Grid2D};

use crate::error::{RasterError, Result};
use crate::window::Window;

/// Parsed ESRI ASCII header.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiHeader {
    pub geodict: GeoGrid,
    pub nodata: Option<f64>,
    /// Number of header lines before the values start.
    pub header_lines: usize,
}

/// Read only the header of an ASCII grid.
pub fn read_header(path: &Path) -> Result<AsciiHeader> {
    let file = File::open(path).map_err(|e| RasterError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut keys: HashMap<String, f64> = HashMap::new();
    let mut header_lines = 0;
    for line in reader.lines() {
        let line = line.map_err(|e| RasterError::io(path, e))?;
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else {
            header_lines += 1;
            continue;
        };
        if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
            break;
        }
        let value = parts
            .next()
            .ok_or_else(|| RasterError::header(path, format!("no value for '{key}'")))?;
        let value: f64 = value
            .parse()
            .map_err(|_| RasterError::header(path, format!("bad value '{value}' for '{key}'")))?;
        keys.insert(key.to_ascii_lowercase(), value);
        header_lines += 1;
    }

    let get = |k: &str| keys.get(k).copied();
    let require = |k: &str| get(k).ok_or_else(|| RasterError::header(path, format!("missing '{k}'")));

    let ncols = require("ncols")? as usize;
    let nrows = require("nrows")? as usize;
    let (dx, dy) = match (get("cellsize"), get("dx"), get("dy")) {
        (Some(c), _, _) => (c, c),
        (None, Some(dx), Some(dy)) => (dx, dy),
        _ => return Err(RasterError::header(path, "missing 'cellsize'")),
    };

    let xmin = match (get("xllcorner"), get("xllcenter")) {
        (Some(x), _) => x + dx / 2.0,
        (None, Some(x)) => x,
        _ => return Err(RasterError::header(path, "missing 'xllcorner'")),
    };
    let ymin = match (get("yllcorner"), get("yllcenter")) {
        (Some(y), _) => y + dy / 2.0,
        (None, Some(y)) => y,
        _ => return Err(RasterError::header(path, "missing 'yllcorner'")),
    };
    if ncols == 0 || nrows == 0 {
        return Err(RasterError::header(path, "empty grid"));
    }
    let ymax = ymin + (nrows - 1) as f64 * dy;

    let geodict = GeoGrid::from_corner(xmin, ymax, dx, dy, ncols, nrows)?;
    Ok(AsciiHeader {
        geodict,
        nodata: get("nodata_value"),
        header_lines,
    })
}

/// Read the whole grid.
pub fn read(path: &Path) -> Result<Grid2D> {
    let header = read_header(path)?;
    let full = Window::full(&header.geodict);
    read_window_with_header(path, &header, &full)
}

/// Read rows/columns of `window` only.
pub fn read_window(path: &Path, window: &Window) -> Result<Grid2D> {
    let header = read_header(path)?;
    read_window_with_header(path, &header, window)
}

fn read_window_with_header(path: &Path, header: &AsciiHeader, window: &Window) -> Result<Grid2D> {
    let geodict = header.geodict.subgrid(window.row_start, window.row_end, window.col_start, window.col_end)?;
    let nx = header.geodict.nx;
    let total = header.geodict.len();
    let first = window.row_start * nx;
    let last = window.row_end * nx;

    let file = File::open(path).map_err(|e| RasterError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut data = Vec::with_capacity(geodict.len());
    let mut index = 0usize;
    'lines: for line in reader.lines().skip(header.header_lines) {
        let line = line.map_err(|e| RasterError::io(path, e))?;
        for token in line.split_whitespace() {
            if index >= last {
                break 'lines;
            }
            if index >= first {
                let col = index % nx;
                if col >= window.col_start && col < window.col_end {
                    let value: f64 = token
                        .parse()
                        .map_err(|_| RasterError::data(path, format!("bad value '{token}' at cell {index}")))?;
                    data.push(match header.nodata {
                        Some(nodata) if value == nodata => f64::NAN,
                        _ => value,
                    });
                }
            }
            index += 1;
        }
    }

    if index < last.min(total) {
        return Err(RasterError::data(
            path,
            format!("expected {total} values, found {index}"),
        ));
    }

    Ok(Grid2D::new(data, geodict)?)
}
