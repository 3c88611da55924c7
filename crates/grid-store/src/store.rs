//! The chunk store interface and its in-memory backend.

use std::path::PathBuf;

use gfail_common::{GeoGrid, Grid2D};
use indexmap::IndexMap;

use crate::error::{Result, StoreError};
use crate::tile::Tile;

/// Named layers on one common grid, readable by rectangular slice.
///
/// Every stored layer has the store's shape. Implementations must be safe to
/// read from several threads at once.
pub trait ChunkStore: Send + Sync {
    /// The common grid every layer is sampled on.
    fn geodict(&self) -> &GeoGrid;

    /// Store (or replace) a layer.
    fn put(&mut self, name: &str, grid: &Grid2D) -> Result<()>;

    fn contains(&self, name: &str) -> bool;

    /// Layer names in insertion order.
    fn names(&self) -> Vec<String>;

    /// Row-major values of `tile` within layer `name`.
    fn read_slice(&self, name: &str, tile: &Tile) -> Result<Vec<f64>>;

    /// A whole layer.
    fn read_whole(&self, name: &str) -> Result<Grid2D> {
        let (rows, cols) = self.geodict().shape();
        let data = self.read_slice(name, &Tile::whole(rows, cols))?;
        Grid2D::new(data, *self.geodict()).map_err(|e| StoreError::storage(e.to_string()))
    }

    /// Drop all stored data. Reads afterwards fail with
    /// [`StoreError::Released`].
    fn release(&mut self) -> Result<()>;

    /// Keep on-disk data after the store is dropped and return where it is.
    /// `None` for backends with nothing on disk.
    fn persist(&mut self) -> Option<PathBuf> {
        None
    }

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Check a grid against the store shape before accepting it.
pub(crate) fn check_shape(name: &str, store: &GeoGrid, grid: &Grid2D) -> Result<()> {
    let (rows, cols) = store.shape();
    let (actual_rows, actual_cols) = grid.geodict().shape();
    if (rows, cols) != (actual_rows, actual_cols) {
        return Err(StoreError::ShapeMismatch {
            name: name.to_string(),
            rows,
            cols,
            actual_rows,
            actual_cols,
        });
    }
    Ok(())
}

/// Check a requested tile against the store shape.
pub(crate) fn check_tile(store: &GeoGrid, tile: &Tile) -> Result<()> {
    let (rows, cols) = store.shape();
    if !tile.fits(rows, cols) {
        return Err(StoreError::OutOfRange {
            requested: tile.to_string(),
            rows,
            cols,
        });
    }
    Ok(())
}

/// Layers held as plain vectors.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    geodict: GeoGrid,
    layers: IndexMap<String, Vec<f64>>,
    released: bool,
}

impl MemoryStore {
    pub fn new(geodict: GeoGrid) -> Self {
        Self {
            geodict,
            layers: IndexMap::new(),
            released: false,
        }
    }
}

impl ChunkStore for MemoryStore {
    fn geodict(&self) -> &GeoGrid {
        &self.geodict
    }

    fn put(&mut self, name: &str, grid: &Grid2D) -> Result<()> {
        if self.released {
            return Err(StoreError::Released);
        }
        check_shape(name, &self.geodict, grid)?;
        self.layers.insert(name.to_string(), grid.data().to_vec());
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        self.layers.keys().cloned().collect()
    }

    fn read_slice(&self, name: &str, tile: &Tile) -> Result<Vec<f64>> {
        if self.released {
            return Err(StoreError::Released);
        }
        check_tile(&self.geodict, tile)?;
        let data = self
            .layers
            .get(name)
            .ok_or_else(|| StoreError::UnknownLayer(name.to_string()))?;

        let nx = self.geodict.nx;
        let mut out = Vec::with_capacity(tile.len());
        for row in tile.row_start..tile.row_end {
            out.extend_from_slice(&data[row * nx + tile.col_start..row * nx + tile.col_end]);
        }
        Ok(out)
    }

    fn release(&mut self) -> Result<()> {
        self.layers.clear();
        self.released = true;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
