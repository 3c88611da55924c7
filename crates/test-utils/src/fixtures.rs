//! Fixture writers: rasters, ShakeMap documents and model configurations
//! in a temporary directory that is removed on drop.

use std::fs;
use std::path::{Path, PathBuf};

use gfail_common::{GeoGrid, Grid2D};
use tempfile::TempDir;

/// Nodata marker written for NaN cells.
pub const NODATA: f64 = -9999.0;

/// Event attributes written into ShakeMap fixtures.
#[derive(Debug, Clone)]
pub struct ShakeEvent {
    pub event_id: String,
    pub version: u32,
    pub magnitude: f64,
    /// ShakeMap-style timestamp, e.g. `2015-04-25T06:11:26UTC`.
    pub timestamp: String,
}

impl Default for ShakeEvent {
    fn default() -> Self {
        Self {
            event_id: "us20002926".to_string(),
            version: 9,
            magnitude: 7.8,
            timestamp: "2015-04-25T06:11:26UTC".to_string(),
        }
    }
}

/// A scratch data directory.
pub struct DataDir {
    dir: TempDir,
}

impl DataDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a subdirectory and return its path.
    pub fn subdir(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path).expect("Failed to create subdirectory");
        path
    }

    /// Write arbitrary text.
    pub fn write_text(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write fixture");
        path
    }

    /// Write `grid` as an ESRI ASCII grid (corner-registered header).
    pub fn write_asc(&self, name: &str, grid: &Grid2D) -> PathBuf {
        self.write_text(name, &esri_ascii_text(grid))
    }

    /// Write `grid` as a little-endian ESRI float grid plus `.hdr` sidecar.
    pub fn write_flt(&self, name: &str, grid: &Grid2D) -> PathBuf {
        let g = grid.geodict();
        let path = self.write_text(name, "");
        let bytes: Vec<u8> = grid
            .data()
            .iter()
            .map(|&v| if v.is_nan() { NODATA } else { v })
            .flat_map(|v| (v as f32).to_le_bytes())
            .collect();
        fs::write(&path, bytes).expect("Failed to write float grid");

        let header = format!(
            "ncols {}\nnrows {}\nxllcorner {}\nyllcorner {}\ncellsize {}\nNODATA_value {}\nbyteorder LSBFIRST\n",
            g.nx,
            g.ny,
            g.xmin - g.dx / 2.0,
            g.ymin - g.dy / 2.0,
            g.dx,
            NODATA
        );
        fs::write(path.with_extension("hdr"), header).expect("Failed to write header");
        path
    }

    /// Write a ShakeMap `grid.xml`-style document.
    pub fn write_shakemap(&self, name: &str, event: &ShakeEvent, fields: &[(&str, &str, &Grid2D)]) -> PathBuf {
        self.write_text(name, &shakemap_xml(event, fields))
    }
}

impl Default for DataDir {
    fn default() -> Self {
        Self::new()
    }
}

/// ESRI ASCII text for `grid`; NaN cells become [`NODATA`].
pub fn esri_ascii_text(grid: &Grid2D) -> String {
    let g = grid.geodict();
    let mut out = String::new();
    out.push_str(&format!("ncols {}\nnrows {}\n", g.nx, g.ny));
    out.push_str(&format!(
        "xllcorner {}\nyllcorner {}\n",
        g.xmin - g.dx / 2.0,
        g.ymin - g.dy / 2.0
    ));
    if (g.dx - g.dy).abs() < 1e-12 {
        out.push_str(&format!("cellsize {}\n", g.dx));
    } else {
        out.push_str(&format!("dx {}\ndy {}\n", g.dx, g.dy));
    }
    out.push_str(&format!("NODATA_value {NODATA}\n"));
    for row in grid.data().chunks(g.nx) {
        let line: Vec<String> = row
            .iter()
            .map(|&v| if v.is_nan() { NODATA.to_string() } else { v.to_string() })
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

/// A ShakeMap XML document with the given fields. All grids must share one
/// geodict; `(name, units, grid)` names are written upper-case.
pub fn shakemap_xml(event: &ShakeEvent, fields: &[(&str, &str, &Grid2D)]) -> String {
    let g: GeoGrid = *fields.first().expect("at least one field").2.geodict();
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"US-ASCII\" standalone=\"yes\"?>\n");
    out.push_str(&format!(
        "<shakemap_grid event_id=\"{id}\" shakemap_id=\"{id}\" shakemap_version=\"{v}\" code_version=\"3.5\" map_status=\"RELEASED\" shakemap_event_type=\"ACTUAL\">\n",
        id = event.event_id,
        v = event.version
    ));
    out.push_str(&format!(
        "<event event_id=\"{}\" magnitude=\"{}\" depth=\"10.0\" lat=\"{}\" lon=\"{}\" event_timestamp=\"{}\" event_network=\"us\" event_description=\"Synthetic\" />\n",
        event.event_id,
        event.magnitude,
        (g.ymin + g.ymax) / 2.0,
        (g.xmin + g.xmax) / 2.0,
        event.timestamp
    ));
    out.push_str(&format!(
        "<grid_specification lon_min=\"{}\" lat_min=\"{}\" lon_max=\"{}\" lat_max=\"{}\" nominal_lon_spacing=\"{}\" nominal_lat_spacing=\"{}\" nlon=\"{}\" nlat=\"{}\" />\n",
        g.xmin, g.ymin, g.xmax, g.ymax, g.dx, g.dy, g.nx, g.ny
    ));
    out.push_str("<grid_field index=\"1\" name=\"LON\" units=\"dd\" />\n");
    out.push_str("<grid_field index=\"2\" name=\"LAT\" units=\"dd\" />\n");
    for (i, (name, units, _)) in fields.iter().enumerate() {
        out.push_str(&format!(
            "<grid_field index=\"{}\" name=\"{}\" units=\"{}\" />\n",
            i + 3,
            name.to_uppercase(),
            units
        ));
    }
    out.push_str("<grid_data>\n");
    for row in 0..g.ny {
        for col in 0..g.nx {
            let (x, y) = g.cell_center(row, col);
            out.push_str(&format!("{x:.4} {y:.4}"));
            for (_, _, grid) in fields {
                let v = grid.get(row, col).unwrap_or(f64::NAN);
                out.push_str(&format!(" {v}"));
            }
            out.push('\n');
        }
    }
    out.push_str("</grid_data>\n</shakemap_grid>\n");
    out
}
