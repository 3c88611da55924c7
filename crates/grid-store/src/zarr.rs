//! Zarr V3 spill backend.
//!
//! Each layer is written as its own `float64` array (row-major `[rows, cols]`,
//! square chunks, NaN fill) under a scoped temporary directory. The directory
//! is removed when the store is released or dropped unless it was persisted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gfail_common::{GeoGrid, Grid2D};
use indexmap::IndexMap;
use tempfile::TempDir;
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::config::{StoreConfig, ZarrCompression};
use crate::error::{Result, StoreError};
use crate::store::{check_shape, check_tile, ChunkStore};
use crate::tile::Tile;

/// Layers spilled to Zarr arrays on local disk.
pub struct ZarrSpillStore {
    geodict: GeoGrid,
    config: StoreConfig,
    dir: Option<TempDir>,
    kept: Option<PathBuf>,
    arrays: IndexMap<String, Array<FilesystemStore>>,
    released: bool,
}

impl ZarrSpillStore {
    /// Create the spill directory (under `config.spill_dir` if set).
    pub fn create(geodict: GeoGrid, config: &StoreConfig) -> Result<Self> {
        let dir = match &config.spill_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::storage(format!("{}: {e}", parent.display())))?;
                tempfile::Builder::new().prefix("gfail-spill-").tempdir_in(parent)
            }
            None => tempfile::Builder::new().prefix("gfail-spill-").tempdir(),
        }
        .map_err(|e| StoreError::storage(e.to_string()))?;

        info!(
            path = %dir.path().display(),
            rows = geodict.ny,
            cols = geodict.nx,
            chunk_size = config.zarr_chunk_size,
            compression = %config.zarr_compression,
            "Created spill store"
        );

        Ok(Self {
            geodict,
            config: config.clone(),
            dir: Some(dir),
            kept: None,
            arrays: IndexMap::new(),
            released: false,
        })
    }

    /// Directory holding the arrays, while it exists.
    pub fn root(&self) -> Option<&Path> {
        match (&self.dir, &self.kept) {
            (Some(dir), _) => Some(dir.path()),
            (None, Some(kept)) => Some(kept.as_path()),
            (None, None) => None,
        }
    }

    fn build_array(&self, store: Arc<FilesystemStore>, name: &str) -> Result<Array<FilesystemStore>> {
        let g = &self.geodict;
        let mut attrs = serde_json::Map::new();
        attrs.insert("layer".to_string(), serde_json::json!(name));
        attrs.insert("bounds".to_string(), serde_json::json!([g.xmin, g.xmax, g.ymin, g.ymax]));
        attrs.insert("cell_size".to_string(), serde_json::json!([g.dx, g.dy]));

        let chunk = self.config.zarr_chunk_size as u64;
        let chunk_grid: zarrs::array::ChunkGrid = vec![chunk, chunk]
            .try_into()
            .map_err(|e| StoreError::Config(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            vec![g.ny as u64, g.nx as u64], // shape [rows, cols]
            DataType::Float64,
            chunk_grid,
            FillValue::from(f64::NAN),
        );
        let mut builder = binding.attributes(attrs);

        if self.config.zarr_compression != ZarrCompression::None {
            builder = builder.bytes_to_bytes_codecs(vec![self.compression_codec()?]);
        }

        builder
            .build(store, "/")
            .map_err(|e| StoreError::zarr(e.to_string()))
    }

    fn compression_codec(&self) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.zarr_compression_level)
            .map_err(|_| StoreError::Config("Invalid compression level".to_string()))?;

        let compressor = match self.config.zarr_compression {
            ZarrCompression::None => {
                return Err(StoreError::Config("No compression configured".to_string()));
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        // typesize is required when shuffle is enabled
        let codec = BloscCodec::new(compressor, level, None, BloscShuffleMode::Shuffle, Some(8))
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

impl ChunkStore for ZarrSpillStore {
    fn geodict(&self) -> &GeoGrid {
        &self.geodict
    }

    fn put(&mut self, name: &str, grid: &Grid2D) -> Result<()> {
        if self.released {
            return Err(StoreError::Released);
        }
        check_shape(name, &self.geodict, grid)?;
        let root = self.root().ok_or(StoreError::Released)?.to_path_buf();

        let index = self.arrays.get_index_of(name).unwrap_or(self.arrays.len());
        let path = root.join(format!("layer_{index:03}"));
        std::fs::create_dir_all(&path).map_err(|e| StoreError::storage(format!("{}: {e}", path.display())))?;
        let store = Arc::new(FilesystemStore::new(&path).map_err(|e| StoreError::storage(e.to_string()))?);

        let array = self.build_array(store, name)?;
        array
            .store_metadata()
            .map_err(|e| StoreError::storage(e.to_string()))?;

        let subset = ArraySubset::new_with_start_shape(vec![0, 0], vec![self.geodict.ny as u64, self.geodict.nx as u64])
            .map_err(|e| StoreError::storage(e.to_string()))?;
        array
            .store_array_subset_elements::<f64>(&subset, grid.data())
            .map_err(|e| StoreError::storage(e.to_string()))?;

        debug!(layer = name, path = %path.display(), "Spilled layer");
        self.arrays.insert(name.to_string(), array);
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        self.arrays.keys().cloned().collect()
    }

    fn read_slice(&self, name: &str, tile: &Tile) -> Result<Vec<f64>> {
        if self.released {
            return Err(StoreError::Released);
        }
        check_tile(&self.geodict, tile)?;
        let array = self
            .arrays
            .get(name)
            .ok_or_else(|| StoreError::UnknownLayer(name.to_string()))?;

        // Zarr uses [row, col] indexing
        let subset = ArraySubset::new_with_start_shape(
            vec![tile.row_start as u64, tile.col_start as u64],
            vec![tile.rows() as u64, tile.cols() as u64],
        )
        .map_err(|e| StoreError::storage(e.to_string()))?;

        array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(|e| StoreError::zarr(e.to_string()))
    }

    fn release(&mut self) -> Result<()> {
        self.arrays.clear();
        self.released = true;
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close().map_err(|e| StoreError::storage(format!("{}: {e}", path.display())))?;
            debug!(path = %path.display(), "Removed spill store");
        }
        Ok(())
    }

    fn persist(&mut self) -> Option<PathBuf> {
        if let Some(kept) = &self.kept {
            return Some(kept.clone());
        }
        let dir = self.dir.take()?;
        #[allow(deprecated)]
        let path = dir.into_path();
        info!(path = %path.display(), "Keeping spill store on disk");
        self.kept = Some(path.clone());
        Some(path)
    }

    fn backend(&self) -> &'static str {
        "zarr-spill"
    }
}
