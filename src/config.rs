//! Configuration module for the vector database.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `VECTORDB_` and use double
//! underscores to separate nested levels:
//! - `VECTORDB_EMBEDDING__MODEL=all-MiniLM-L6-v2` sets `embedding.model`
//! - `VECTORDB_SEARCH__BRUTEFORCE_CEILING=5000` sets `search.bruteforce_ceiling`
//! - `VECTORDB_INDEX__EF=100` sets `index.ef`

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::index::DistanceSpace;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory where persisted indexes are written
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Embedding generation settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Index construction settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Search behaviour settings
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Dimension the configured model produces
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Distance space used by every index in this process
    #[serde(default)]
    pub space: DistanceSpace,

    /// Record count above which the shared approximate index is created
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// HNSW: max connections per node, fixed at build time
    #[serde(default = "default_m")]
    pub m: usize,

    /// HNSW: construction-time beam width, fixed at build time
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// HNSW: query-time beam width, tunable per call
    #[serde(default = "default_ef")]
    pub ef: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Default number of results when the caller does not pass k
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Candidate count below which search uses a fresh brute-force scan
    #[serde(default = "default_bruteforce_ceiling")]
    pub bruteforce_ceiling: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_persist_dir() -> PathBuf {
    PathBuf::from(".vectordb")
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_high_water_mark() -> usize {
    10_000
}
fn default_m() -> usize {
    64
}
fn default_ef_construction() -> usize {
    128
}
fn default_ef() -> usize {
    50
}
fn default_max_results() -> usize {
    10
}
fn default_bruteforce_ceiling() -> usize {
    10_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            persist_dir: default_persist_dir(),
            debug: false,
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            space: DistanceSpace::default(),
            high_water_mark: default_high_water_mark(),
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef: default_ef(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            bruteforce_ceiling: default_bruteforce_ceiling(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence: defaults, then
    /// `vectordb.toml`, then `VECTORDB_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(PathBuf::from("vectordb.toml"))
    }

    /// Load settings reading the TOML layer from an explicit path.
    pub fn load_from(config_file: PathBuf) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("VECTORDB_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Read(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Sanity checks that are fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid {
                reason: "embedding.dimension must be non-zero".to_string(),
            });
        }
        if self.index.m == 0 || self.index.ef_construction == 0 || self.index.ef == 0 {
            return Err(ConfigError::Invalid {
                reason: "index.m, index.ef_construction and index.ef must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(settings.embedding.dimension, 384);
        assert_eq!(settings.index.space, DistanceSpace::L2);
        assert_eq!(settings.index.high_water_mark, 10_000);
        assert_eq!(settings.index.m, 64);
        assert_eq!(settings.index.ef_construction, 128);
        assert_eq!(settings.index.ef, 50);
        assert_eq!(settings.search.max_results, 10);
        assert_eq!(settings.search.bruteforce_ceiling, 10_000);
        assert_eq!(settings.persist_dir, PathBuf::from(".vectordb"));
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("vectordb.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            "[search]\nmax_results = 25\n\n[index]\nef = 200\n"
        )
        .unwrap();

        let settings = Settings::load_from(config_path).unwrap();
        assert_eq!(settings.search.max_results, 25);
        assert_eq!(settings.index.ef, 200);
        // Untouched fields keep their defaults
        assert_eq!(settings.search.bruteforce_ceiling, 10_000);
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let mut settings = Settings::default();
        settings.embedding.dimension = 0;
        assert!(settings.validate().is_err());
    }
}
