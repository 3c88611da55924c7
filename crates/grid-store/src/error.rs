//! Error types for layer storage.

use thiserror::Error;

/// Errors that can occur while storing or reading aligned layers.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No layer with this name has been stored.
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),

    /// The requested slice is outside the stored grid.
    #[error("slice {requested} is outside grid {rows}x{cols}")]
    OutOfRange {
        requested: String,
        rows: usize,
        cols: usize,
    },

    /// The grid handed to the store does not match its shape.
    #[error("layer '{name}' is {actual_rows}x{actual_cols}, store expects {rows}x{cols}")]
    ShapeMismatch {
        name: String,
        rows: usize,
        cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// Chunk sizes must be positive.
    #[error("invalid chunk size: {0}")]
    InvalidChunk(String),

    /// Zarr format or codec error.
    #[error("Zarr error: {0}")]
    Zarr(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The store was released and its data is gone.
    #[error("layer storage has been released")]
    Released,
}

impl StoreError {
    pub fn zarr(msg: impl Into<String>) -> Self {
        Self::Zarr(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
