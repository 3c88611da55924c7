//! Configuration for layer storage.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where aligned layers are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Plain vectors in memory.
    Memory,
    /// Zarr V3 arrays in a scoped temporary directory.
    #[default]
    Spill,
}

impl StoreBackend {
    /// Parse from string (case-insensitive), falling back to `Spill`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            _ => Self::Spill,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Spill => "spill",
        }
    }
}

/// Configuration for layer storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend used for aligned layers.
    pub backend: StoreBackend,

    /// Parent directory for spill directories (system temp dir if unset).
    pub spill_dir: Option<PathBuf>,

    /// Chunk dimension for spilled Zarr arrays (square chunks).
    pub zarr_chunk_size: usize,

    /// Compression codec for spilled Zarr arrays.
    pub zarr_compression: ZarrCompression,

    /// Compression level (1-9).
    pub zarr_compression_level: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Spill,
            spill_dir: None,
            zarr_chunk_size: 256,
            zarr_compression: ZarrCompression::BloscLz4,
            zarr_compression_level: 1,
        }
    }
}

impl StoreConfig {
    /// In-memory storage with defaults for everything else.
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GFAIL_STORE_BACKEND") {
            config.backend = StoreBackend::from_str(&val);
        }

        if let Ok(val) = std::env::var("GFAIL_SPILL_DIR") {
            if !val.is_empty() {
                config.spill_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("GFAIL_ZARR_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                config.zarr_chunk_size = size;
            }
        }

        if let Ok(val) = std::env::var("GFAIL_ZARR_COMPRESSION") {
            config.zarr_compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("GFAIL_ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.zarr_compression_level = level;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.zarr_chunk_size == 0 {
            return Err("zarr_chunk_size must be > 0".to_string());
        }

        if self.zarr_compression != ZarrCompression::None
            && (self.zarr_compression_level == 0 || self.zarr_compression_level > 9)
        {
            return Err("zarr_compression_level must be 1-9".to_string());
        }

        if let Some(dir) = &self.spill_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(format!("spill_dir {} is not a directory", dir.display()));
            }
        }

        Ok(())
    }
}

/// Compression codec for spilled Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    #[default]
    BloscLz4,
    /// Blosc with Zstd.
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "zstd" | "blosc_zstd" => Self::BloscZstd,
            _ => Self::BloscLz4,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
