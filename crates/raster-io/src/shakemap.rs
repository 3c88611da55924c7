//! ShakeMap `grid.xml` / `uncertainty.xml` reader.
//!
//! ```xml
//! <shakemap_grid event_id="us1000abcd" shakemap_id="us1000abcd" shakemap_version="3" ...>
//!   <event magnitude="7.8" event_timestamp="2015-04-25T06:11:26UTC" .../>
//!   <grid_specification lon_min="..." lat_min="..." lon_max="..." lat_max="..."
//!        nominal_lon_spacing="..." nominal_lat_spacing="..." nlon="..." nlat="..."/>
//!   <grid_field index="1" name="LON" units="dd"/>
//!   <grid_field index="2" name="LAT" units="dd"/>
//!   <grid_field index="3" name="PGA" units="pctg"/>
//!   <grid_data>
//!   lon lat pga ...
//!   </grid_data>
//! </shakemap_grid>
//! ```
//!
//! Field names are lower-cased. Cell spacing is derived from the bounds and
//! counts rather than taken from the nominal spacing attributes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use gfail_common::{BoundingBox, GeoGrid, Grid2D};
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

use crate::error::{RasterError, Result};

/// Event metadata from the `<event>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInfo {
    pub event_id: String,
    pub magnitude: f64,
    pub time: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// A ShakeMap grid document: metadata plus one grid per field.
#[derive(Debug, Clone)]
pub struct ShakeGrid {
    pub event: EventInfo,
    pub shakemap_id: String,
    pub shakemap_version: String,
    geodict: GeoGrid,
    units: HashMap<String, String>,
    fields: IndexMap<String, Grid2D>,
}

impl ShakeGrid {
    /// Read and parse a ShakeMap XML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let start = std::time::Instant::now();
        let text = fs::read_to_string(path).map_err(|e| RasterError::io(path, e))?;
        let grid = Self::parse(&text, path)?;
        info!(
            path = %path.display(),
            event = %grid.event.event_id,
            fields = grid.fields.len(),
            rows = grid.geodict.ny,
            cols = grid.geodict.nx,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded ShakeMap grid"
        );
        Ok(grid)
    }

    /// Parse a document held in memory. `origin` is only used in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut root: Option<HashMap<String, String>> = None;
        let mut event: Option<HashMap<String, String>> = None;
        let mut spec: Option<HashMap<String, String>> = None;
        let mut columns: Vec<(usize, String, String)> = Vec::new();
        let mut body = String::new();
        let mut in_data = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"shakemap_grid" => root = Some(attributes(&e, origin)?),
                    b"event" => event = Some(attributes(&e, origin)?),
                    b"grid_specification" => spec = Some(attributes(&e, origin)?),
                    b"grid_field" => {
                        let attrs = attributes(&e, origin)?;
                        let index = require(&attrs, "index", origin)?
                            .parse::<usize>()
                            .map_err(|err| RasterError::xml(origin, format!("grid_field index: {err}")))?;
                        let name = require(&attrs, "name", origin)?.to_ascii_lowercase();
                        let units = attrs.get("units").cloned().unwrap_or_default();
                        columns.push((index, name, units));
                    }
                    b"grid_data" => in_data = true,
                    _ => {}
                },
                Ok(Event::Text(t)) if in_data => {
                    let chunk = t.unescape().map_err(|err| RasterError::xml(origin, err))?;
                    body.push_str(&chunk);
                    body.push('\n');
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"grid_data" => in_data = false,
                Ok(Event::Eof) => break,
                Err(err) => {
                    return Err(RasterError::xml(
                        origin,
                        format!("at position {}: {err}", reader.buffer_position()),
                    ))
                }
                _ => {}
            }
        }

        let root = root.ok_or_else(|| RasterError::xml(origin, "missing <shakemap_grid>"))?;
        let event = event.ok_or_else(|| RasterError::xml(origin, "missing <event>"))?;
        let spec = spec.ok_or_else(|| RasterError::xml(origin, "missing <grid_specification>"))?;

        let geodict = grid_spec(&spec, origin)?;
        let event = EventInfo {
            event_id: root
                .get("event_id")
                .or_else(|| event.get("event_id"))
                .cloned()
                .unwrap_or_default(),
            magnitude: number(&event, "magnitude", origin)?,
            time: event.get("event_timestamp").and_then(|s| parse_timestamp(s)),
            description: event.get("event_description").cloned(),
        };

        columns.sort_by_key(|(index, _, _)| *index);
        let (fields, units) = grid_body(&body, &columns, &geodict, origin)?;
        debug!(
            fields = ?fields.keys().collect::<Vec<_>>(),
            "Parsed ShakeMap fields"
        );

        Ok(Self {
            event,
            shakemap_id: root.get("shakemap_id").cloned().unwrap_or_default(),
            shakemap_version: root.get("shakemap_version").cloned().unwrap_or_default(),
            geodict,
            units,
            fields,
        })
    }

    pub fn geodict(&self) -> &GeoGrid {
        &self.geodict
    }

    /// `<shakemap_id>_ver<version>`.
    pub fn identity(&self) -> String {
        format!("{}_ver{}", self.shakemap_id, self.shakemap_version)
    }

    /// Field names in document order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The grid of one field (lower-case name).
    pub fn layer(&self, name: &str) -> Result<&Grid2D> {
        self.fields.get(name).ok_or_else(|| RasterError::MissingField {
            field: name.to_string(),
            available: self.fields.keys().cloned().collect::<Vec<_>>().join(", "),
        })
    }

    /// Units attribute of a field.
    pub fn units(&self, name: &str) -> Option<&str> {
        self.units.get(name).map(String::as_str)
    }

    /// Cell-center bounds of every cell where `field` exceeds `threshold`,
    /// or `None` when no cell does.
    pub fn bounds_above_threshold(&self, field: &str, threshold: f64) -> Result<Option<BoundingBox>> {
        let grid = self.layer(field)?;
        let mut bounds: Option<BoundingBox> = None;
        for row in 0..self.geodict.ny {
            for col in 0..self.geodict.nx {
                let above = grid.get(row, col).is_some_and(|v| v > threshold);
                if !above {
                    continue;
                }
                let (x, y) = self.geodict.cell_center(row, col);
                bounds = Some(match bounds {
                    None => BoundingBox::new(x, x, y, y),
                    Some(b) => BoundingBox::new(b.xmin.min(x), b.xmax.max(x), b.ymin.min(y), b.ymax.max(y)),
                });
            }
        }
        Ok(bounds)
    }
}

/// Path of the uncertainty document that conventionally sits next to a grid.
pub fn sibling_uncertainty(grid_path: &Path) -> PathBuf {
    grid_path.with_file_name("uncertainty.xml")
}

fn attributes(e: &BytesStart, origin: &Path) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| RasterError::xml(origin, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| RasterError::xml(origin, err))?;
        map.insert(key, value.into_owned());
    }
    Ok(map)
}

fn require<'a>(attrs: &'a HashMap<String, String>, key: &str, origin: &Path) -> Result<&'a str> {
    attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| RasterError::xml(origin, format!("missing attribute '{key}'")))
}

fn number(attrs: &HashMap<String, String>, key: &str, origin: &Path) -> Result<f64> {
    let raw = require(attrs, key, origin)?;
    raw.trim()
        .parse()
        .map_err(|_| RasterError::xml(origin, format!("attribute '{key}' is not a number: '{raw}'")))
}

fn count(attrs: &HashMap<String, String>, key: &str, origin: &Path) -> Result<usize> {
    let raw = require(attrs, key, origin)?;
    raw.trim()
        .parse()
        .map_err(|_| RasterError::xml(origin, format!("attribute '{key}' is not a count: '{raw}'")))
}

fn grid_spec(spec: &HashMap<String, String>, origin: &Path) -> Result<GeoGrid> {
    let xmin = number(spec, "lon_min", origin)?;
    let xmax = number(spec, "lon_max", origin)?;
    let ymin = number(spec, "lat_min", origin)?;
    let ymax = number(spec, "lat_max", origin)?;
    let nx = count(spec, "nlon", origin)?;
    let ny = count(spec, "nlat", origin)?;
    if nx < 2 || ny < 2 {
        return Err(RasterError::xml(origin, format!("grid too small ({ny}x{nx})")));
    }
    let dx = (xmax - xmin) / (nx - 1) as f64;
    let dy = (ymax - ymin) / (ny - 1) as f64;
    Ok(GeoGrid::new(xmin, xmax, ymin, ymax, dx, dy, nx, ny)?)
}

type Fields = (IndexMap<String, Grid2D>, HashMap<String, String>);

fn grid_body(body: &str, columns: &[(usize, String, String)], geodict: &GeoGrid, origin: &Path) -> Result<Fields> {
    let lon_col = columns.iter().position(|(_, name, _)| name == "lon");
    let lat_col = columns.iter().position(|(_, name, _)| name == "lat");
    let (Some(lon_col), Some(lat_col)) = (lon_col, lat_col) else {
        return Err(RasterError::xml(origin, "grid_field LON/LAT missing"));
    };

    let mut values: Vec<Vec<f64>> = vec![vec![f64::NAN; geodict.len()]; columns.len()];
    let mut seen = 0usize;
    let mut row_values = Vec::with_capacity(columns.len());

    for (line_no, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        row_values.clear();
        for token in line.split_whitespace() {
            let v: f64 = token
                .parse()
                .map_err(|_| RasterError::xml(origin, format!("grid_data line {}: bad value '{token}'", line_no + 1)))?;
            row_values.push(v);
        }
        if row_values.len() != columns.len() {
            return Err(RasterError::xml(
                origin,
                format!(
                    "grid_data line {}: {} values for {} fields",
                    line_no + 1,
                    row_values.len(),
                    columns.len()
                ),
            ));
        }

        let (fr, fc) = geodict.fractional_index(row_values[lon_col], row_values[lat_col]);
        let (row, col) = (fr.round(), fc.round());
        if row < 0.0 || col < 0.0 || row as usize >= geodict.ny || col as usize >= geodict.nx {
            return Err(RasterError::xml(
                origin,
                format!("grid_data line {}: point outside grid", line_no + 1),
            ));
        }
        let cell = row as usize * geodict.nx + col as usize;
        for (field, v) in values.iter_mut().zip(&row_values) {
            field[cell] = *v;
        }
        seen += 1;
    }

    if seen != geodict.len() {
        return Err(RasterError::xml(
            origin,
            format!("grid_data has {seen} points, expected {}", geodict.len()),
        ));
    }

    let mut fields = IndexMap::new();
    let mut units = HashMap::new();
    for (i, ((_, name, unit), data)) in columns.iter().zip(values).enumerate() {
        if i == lon_col || i == lat_col {
            continue;
        }
        fields.insert(name.clone(), Grid2D::new(data, *geodict)?);
        units.insert(name.clone(), unit.clone());
    }
    Ok((fields, units))
}

/// Parse ShakeMap timestamps such as `2015-04-25T06:11:26UTC` or
/// `2015-04-25T06:11:26.5Z`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim().trim_end_matches("UTC").trim_end_matches('Z').trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
}
