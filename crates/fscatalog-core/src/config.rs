//! Catalog configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Number of leading bytes sampled for the identity hash.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Default retention count for duplicate reporting.
pub const DEFAULT_KEEP: usize = 2;

/// Configuration for walking, hashing and duplicate reporting.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct CatalogConfig {
    /// Bytes read from the start of each file when hashing.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Number of hashing workers (0 = auto-detect).
    #[builder(default = "0")]
    pub threads: usize,

    /// Buckets must hold more than this many paths to be reported.
    #[builder(default = "DEFAULT_KEEP")]
    pub keep: usize,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    pub include_hidden: bool,

    /// Emit a progress update every N hashed files.
    #[builder(default = "256")]
    pub progress_interval: u64,
}

impl CatalogConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be greater than zero".to_string());
        }
        if self.progress_interval == Some(0) {
            return Err("Progress interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl CatalogConfig {
    /// Create a new config builder.
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder::default()
    }

    /// Check values that serde could not reject on its own.
    pub fn validate(&self) -> Result<(), crate::CatalogError> {
        if self.chunk_size == 0 {
            return Err(crate::CatalogError::InvalidConfig {
                message: "chunk_size must be greater than zero".to_string(),
            });
        }
        if self.progress_interval == 0 {
            return Err(crate::CatalogError::InvalidConfig {
                message: "progress_interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads: 0,
            keep: DEFAULT_KEEP,
            include_hidden: true,
            progress_interval: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CatalogConfig::builder()
            .chunk_size(4096usize)
            .threads(4usize)
            .keep(1usize)
            .build()
            .unwrap();

        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.threads, 4);
        assert_eq!(config.keep, 1);
        assert!(config.include_hidden);
    }

    #[test]
    fn test_builder_rejects_zero_chunk() {
        let result = CatalogConfig::builder().chunk_size(0usize).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_matches_builder() {
        let built = CatalogConfig::builder().build().unwrap();
        assert_eq!(built, CatalogConfig::default());
    }
}
