//! vmscale.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::{parse_duration, DurationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {source}")]
    Duration {
        field: &'static str,
        source: DurationError,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VmscaleConfig {
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

/// Tuning for the policy builder and the scaling engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest policy duration accepted, in seconds.
    pub min_duration_secs: u64,
    /// Quiet time applied when a policy is created without one.
    pub default_quiet_time_secs: u64,
    /// Deadline for a single metric fetch.
    pub fetch_timeout: String,
    /// Deadline for a single scale-up / scale-down dispatch.
    pub action_timeout: String,
    /// How often the daemon rescans the store for new or removed groups.
    pub discovery_interval: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: Option<String>,
    pub json: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/vmscale"),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 30,
            default_quiet_time_secs: 300,
            fetch_timeout: "5s".to_string(),
            action_timeout: "120s".to_string(),
            discovery_interval: "30s".to_string(),
        }
    }
}

impl VmscaleConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: VmscaleConfig = toml::from_str(content)?;
        config.engine.fetch_timeout()?;
        config.engine.action_timeout()?;
        config.engine.discovery_interval()?;
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.store.data_dir.join("vmscale.redb")
    }
}

impl EngineConfig {
    pub fn fetch_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("engine.fetch_timeout", &self.fetch_timeout)
    }

    pub fn action_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("engine.action_timeout", &self.action_timeout)
    }

    pub fn discovery_interval(&self) -> Result<Duration, ConfigError> {
        duration_field("engine.discovery_interval", &self.discovery_interval)
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|source| ConfigError::Duration { field, source })
}
