//! Runtime configuration.
//!
//! Hierarchical configuration with serde-supplied defaults, an optional file
//! source and `REPOCAT_`-prefixed environment overrides. The service object
//! is constructed from a [`RepocatConfig`] exactly once; nothing reads
//! configuration ambiently.

use crate::error::Error;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepocatConfig {
    /// Cache store settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Fetch worker pool settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Output artifact settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory; defaults to the platform cache location
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Entry time-to-live in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval between background sweeps in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Resolve the cache directory, falling back to the platform cache
    /// location and finally the system temp directory.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "repocat")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("repocat_cache"))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Fetch worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of retrieval workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Timeout for a single remote retrieval in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Output artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory artifacts are written to
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl RepocatConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `REPOCAT_`-prefixed environment variables (`REPOCAT_CACHE__TTL_SECS`).
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        let loaded = builder
            .add_source(config::Environment::with_prefix("REPOCAT").separator("__"))
            .build()?;
        Ok(loaded.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepocatConfig::default();
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.cache.sweep_interval_secs, 300);
        assert_eq!(config.fetch.workers, 4);
        assert_eq!(config.fetch.timeout_secs, 300);
        assert_eq!(config.output.dir, PathBuf::from("output"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = RepocatConfig::load(None).unwrap();
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_resolve_dir_prefers_explicit_dir() {
        let config = CacheConfig {
            dir: Some(PathBuf::from("/tmp/custom-cache")),
            ..CacheConfig::default()
        };
        assert_eq!(config.resolve_dir(), PathBuf::from("/tmp/custom-cache"));
    }
}
