//! Configuration types for bloomkv
//!
//! Mirrors the TOML layout read by the binaries:
//!
//! ```toml
//! [store]
//! path = "./bloomkv.redb"
//! bucket = "default"
//!
//! [filter]
//! max_keys_per_bucket = 100000
//! false_positive_rate = 0.01
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::types::BucketName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest accepted `[filter].false_positive_rate`. Filter size grows with
/// `-ln(rate)`, so this also bounds the memory of one bucket's cache.
pub const MIN_FALSE_POSITIVE_RATE: f64 = 1e-9;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, or defaults if the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot express
    pub fn validate(&self) -> Result<()> {
        BucketName::new(self.store.bucket.as_str())?;
        self.filter.validate()
    }
}

/// Durable store location and initial bucket
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the store file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Bucket made active when the backend opens
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            bucket: default_bucket(),
        }
    }
}

/// Sizing of the per-bucket membership filter
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Expected number of keys per bucket
    #[serde(default = "default_max_keys_per_bucket")]
    pub max_keys_per_bucket: usize,
    /// Target false-positive rate at capacity
    #[serde(default = "default_false_positive_rate")]
    pub false_positive_rate: f64,
}

impl FilterConfig {
    /// Create a filter config
    #[must_use]
    pub const fn new(max_keys_per_bucket: usize, false_positive_rate: f64) -> Self {
        Self {
            max_keys_per_bucket,
            false_positive_rate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_keys_per_bucket == 0 {
            return Err(Error::configuration("max_keys_per_bucket must be positive"));
        }
        if !(MIN_FALSE_POSITIVE_RATE..1.0).contains(&self.false_positive_rate) {
            return Err(Error::configuration(format!(
                "false_positive_rate must be in [{MIN_FALSE_POSITIVE_RATE:e}, 1), got {}",
                self.false_positive_rate
            )));
        }
        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new(
            default_max_keys_per_bucket(),
            default_false_positive_rate(),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./bloomkv.redb")
}

fn default_bucket() -> String {
    "default".to_string()
}

const fn default_max_keys_per_bucket() -> usize {
    100_000
}

const fn default_false_positive_rate() -> f64 {
    0.01
}

fn default_log_level() -> String {
    "info".to_string()
}
