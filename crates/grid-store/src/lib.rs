//! Chunk-addressable storage for aligned model layers.
//!
//! The model aligner writes every layer once, on the common model grid, and
//! the evaluator reads it back tile by tile through [`ChunkStore`]. Two
//! backends are provided:
//!
//! - [`MemoryStore`]: plain vectors
//! - [`ZarrSpillStore`]: Zarr V3 arrays in a scoped temporary directory,
//!   removed on release or drop

pub mod config;
pub mod error;
pub mod store;
pub mod tile;
pub mod zarr;

pub use config::{StoreBackend, StoreConfig, ZarrCompression};
pub use error::{Result, StoreError};
pub use store::{ChunkStore, MemoryStore};
pub use tile::{partition, Tile};
pub use zarr::ZarrSpillStore;

use gfail_common::GeoGrid;

/// Open an empty store for `geodict` with the configured backend.
pub fn open_store(geodict: GeoGrid, config: &StoreConfig) -> Result<Box<dyn ChunkStore>> {
    config.validate().map_err(StoreError::Config)?;
    Ok(match config.backend {
        StoreBackend::Memory => Box::new(MemoryStore::new(geodict)),
        StoreBackend::Spill => Box::new(ZarrSpillStore::create(geodict, config)?),
    })
}
