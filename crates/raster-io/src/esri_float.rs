//! ESRI binary grid reader (`.flt` / `.bil` data with an `.hdr` sidecar).
//!
//! Two header dialects are accepted:
//! - ArcInfo float grids: `ncols nrows xllcorner yllcorner cellsize
//!   NODATA_value byteorder`;
//! - BIL: `ncols nrows nbands nbits pixeltype byteorder ulxmap ulymap xdim
//!   ydim nodata`.
//!
//! Rows are read by seeking, so a window costs only the bytes it covers.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use gfail_common::{GeoGrid, Grid2D};

use crate::error::{RasterError, Result};
use crate::window::Window;

/// Sample encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Float32,
    Int16,
    UInt8,
}

impl SampleType {
    fn size(&self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Int16 => 2,
            Self::UInt8 => 1,
        }
    }
}

/// Parsed `.hdr` sidecar.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatHeader {
    pub geodict: GeoGrid,
    pub nodata: Option<f64>,
    pub sample: SampleType,
    pub little_endian: bool,
}

/// Path of the sidecar header for a data file.
pub fn header_path(data_path: &Path) -> PathBuf {
    data_path.with_extension("hdr")
}

/// Read the `.hdr` sidecar of `data_path`.
pub fn read_header(data_path: &Path) -> Result<FloatHeader> {
    let hdr = header_path(data_path);
    let text = fs::read_to_string(&hdr).map_err(|e| RasterError::io(&hdr, e))?;

    let mut keys: HashMap<String, String> = HashMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(k), Some(v)) = (parts.next(), parts.next()) {
            keys.insert(k.to_ascii_lowercase(), v.to_string());
        }
    }

    let num = |k: &str| -> Result<Option<f64>> {
        keys.get(k)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| RasterError::header(&hdr, format!("bad value '{v}' for '{k}'")))
            })
            .transpose()
    };
    let require = |k: &str| -> Result<f64> {
        num(k)?.ok_or_else(|| RasterError::header(&hdr, format!("missing '{k}'")))
    };

    let ncols = require("ncols")? as usize;
    let nrows = require("nrows")? as usize;
    if ncols == 0 || nrows == 0 {
        return Err(RasterError::header(&hdr, "empty grid"));
    }
    if let Some(bands) = num("nbands")? {
        if bands != 1.0 {
            return Err(RasterError::header(&hdr, format!("{bands} bands, only 1 is supported")));
        }
    }

    let (xmin, ymax, dx, dy) = if let (Some(ulx), Some(uly)) = (num("ulxmap")?, num("ulymap")?) {
        (ulx, uly, require("xdim")?, require("ydim")?)
    } else {
        let cell = require("cellsize")?;
        let xll = require("xllcorner")?;
        let yll = require("yllcorner")?;
        (xll + cell / 2.0, yll + cell / 2.0 + (nrows - 1) as f64 * cell, cell, cell)
    };

    let nbits = num("nbits")?.unwrap_or(32.0) as u32;
    let pixeltype = keys
        .get("pixeltype")
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| if nbits == 32 { "float".into() } else { "signedint".into() });
    let sample = match (nbits, pixeltype.as_str()) {
        (32, "float") => SampleType::Float32,
        (16, "signedint") => SampleType::Int16,
        (8, _) => SampleType::UInt8,
        (bits, kind) => {
            return Err(RasterError::header(&hdr, format!("unsupported sample type {kind}/{bits}")));
        }
    };

    let little_endian = match keys.get("byteorder").map(|s| s.to_ascii_lowercase()).as_deref() {
        None | Some("i") | Some("lsbfirst") => true,
        Some("m") | Some("msbfirst") => false,
        Some(other) => return Err(RasterError::header(&hdr, format!("unknown byteorder '{other}'"))),
    };

    let nodata = match num("nodata_value")? {
        Some(v) => Some(v),
        None => num("nodata")?,
    };

    Ok(FloatHeader {
        geodict: GeoGrid::from_corner(xmin, ymax, dx, dy, ncols, nrows)?,
        nodata,
        sample,
        little_endian,
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

fn read_window_with_header(path: &Path, header: &FloatHeader, window: &Window) -> Result<Grid2D> {
    let geodict = header.geodict.subgrid(window.row_start, window.row_end, window.col_start, window.col_end)?;

    let file = File::open(path).map_err(|e| RasterError::io(path, e))?;
    let expected = (header.geodict.len() * header.sample.size()) as u64;
    let actual = file.metadata().map_err(|e| RasterError::io(path, e))?.len();
    if actual < expected {
        return Err(RasterError::data(
            path,
            format!("expected {expected} bytes, found {actual}"),
        ));
    }

    let mut reader = BufReader::new(file);
    let size = header.sample.size();
    let row_bytes = header.geodict.nx * size;
    let mut buf = vec![0u8; window.width() * size];
    let mut data = Vec::with_capacity(geodict.len());

    for row in window.row_start..window.row_end {
        let offset = (row * row_bytes + window.col_start * size) as u64;
        reader.seek(SeekFrom::Start(offset)).map_err(|e| RasterError::io(path, e))?;
        reader.read_exact(&mut buf).map_err(|e| RasterError::io(path, e))?;

        data.extend(buf.chunks_exact(size).map(|bytes| {
            let value = decode(bytes, header.sample, header.little_endian);
            match header.nodata {
                Some(nodata) if value == nodata => f64::NAN,
                _ => value,
            }
        }));
    }

    Ok(Grid2D::new(data, geodict)?)
}

fn decode(bytes: &[u8], sample: SampleType, little_endian: bool) -> f64 {
    match sample {
        SampleType::Float32 => {
            let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
            let v = if little_endian {
                f32::from_le_bytes(raw)
            } else {
                f32::from_be_bytes(raw)
            };
            v as f64
        }
        SampleType::Int16 => {
            let raw = [bytes[0], bytes[1]];
            let v = if little_endian {
                i16::from_le_bytes(raw)
            } else {
                i16::from_be_bytes(raw)
            };
            v as f64
        }
        SampleType::UInt8 => bytes[0] as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_flt(dir: &Path, header: &str, values: &[f32], little: bool) -> PathBuf {
        let path = dir.join("layer.flt");
        let bytes: Vec<u8> = values
            .iter()
            .flat_map(|v| if little { v.to_le_bytes() } else { v.to_be_bytes() })
            .collect();
        fs::write(&path, bytes).unwrap();
        fs::write(dir.join("layer.hdr"), header).unwrap();
        path
    }

    #[test]
    fn test_arcinfo_header_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_flt(
            dir.path(),
            "ncols 3\nnrows 2\nxllcorner 10\nyllcorner 20\ncellsize 1\nNODATA_value -9999\nbyteorder LSBFIRST\n",
            &[1.0, 2.0, 3.0, 4.0, -9999.0, 6.0],
            true,
        );
        let grid = read(&path).unwrap();
        assert!((grid.geodict().xmin - 10.5).abs() < 1e-12);
        assert!((grid.geodict().ymax - 21.5).abs() < 1e-12);
        assert_eq!(grid.get(0, 0), Some(1.0));
        assert!(grid.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_bil_header_big_endian_window() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let path = write_flt(
            dir.path(),
            "BYTEORDER M\nLAYOUT BIL\nNROWS 4\nNCOLS 4\nNBANDS 1\nNBITS 32\nPIXELTYPE FLOAT\nULXMAP -100.0\nULYMAP 40.0\nXDIM 0.25\nYDIM 0.25\n",
            &values,
            false,
        );
        let window = Window {
            row_start: 2,
            row_end: 4,
            col_start: 1,
            col_end: 3,
        };
        let grid = read_window(&path, &window).unwrap();
        assert_eq!(grid.data(), &[9.0, 10.0, 13.0, 14.0]);
        assert!((grid.geodict().xmin - (-99.75)).abs() < 1e-12);
        assert!((grid.geodict().ymax - 39.5).abs() < 1e-12);
    }

    #[test]
    fn test_short_data_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_flt(
            dir.path(),
            "ncols 3\nnrows 3\nxllcorner 0\nyllcorner 0\ncellsize 1\n",
            &[1.0, 2.0],
            true,
        );
        assert!(matches!(read(&path), Err(RasterError::InvalidData { .. })));
    }

    #[test]
    fn test_missing_sidecar_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orphan.flt");
        fs::write(&path, [0u8; 16]).unwrap();
        assert!(matches!(read_header(&path), Err(RasterError::Io { .. })));
    }
}
