//! Configuration types for clipnote
//!
//! Every section has serde defaults so a partial (or missing) TOML file is
//! valid. Binaries layer command-line flags on top.

use crate::error::{Error, Result};
use crate::types::{RecordKind, ShardingStrategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub notes: KindConfig,
    pub clipboard: KindConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Sharding strategy configured for a record kind
    #[must_use]
    pub fn sharding_for(&self, kind: RecordKind) -> ShardingStrategy {
        match kind {
            RecordKind::Note => self.notes.sharding.unwrap_or(ShardingStrategy::Individual),
            RecordKind::Clipboard => self
                .clipboard
                .sharding
                .unwrap_or(ShardingStrategy::ByTimeBucket),
        }
    }

    /// Reject configurations that cannot produce a working store
    pub fn validate(&self) -> Result<()> {
        for kind in [RecordKind::Note, RecordKind::Clipboard] {
            match self.sharding_for(kind) {
                ShardingStrategy::ByCountBucket { buckets: 0 }
                | ShardingStrategy::ByHashBucket { buckets: 0 } => {
                    return Err(Error::configuration(format!(
                        "{kind} sharding needs at least one bucket"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Storage location
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Application-owned root directory
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Platform data directory, or `./clipnote-data` when none is known
#[must_use]
pub fn default_base_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "clipnote", "clipnote")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./clipnote-data"))
}

/// Per-tier cache capacities (entries)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// L1: full records
    pub records: usize,
    /// L2: index entries
    pub entries: usize,
    /// L3: search result lists
    pub searches: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            records: 10,
            entries: 100,
            searches: 50,
        }
    }
}

/// Per record kind settings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    /// `None` selects the kind's default strategy
    pub sharding: Option<ShardingStrategy>,
}

/// Logging configuration (consumed by binaries)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
