//! Application configuration
//!
//! Layered loading: compiled defaults, then an optional TOML file named by
//! `CONFIG_PATH`, then environment variables prefixed `SEARCH_SYNC` with `__`
//! as the section separator (e.g. `SEARCH_SYNC__RECOVERY__DELAY_MS`).

use crate::bulk::DEFAULT_FLUSH_BYTE_SIZE;
use crate::recovery::RecoveryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Recovery loop configuration
    #[serde(default)]
    pub recovery: RecoverySettings,

    /// Bulk writer configuration
    #[serde(default)]
    pub bulk: BulkSettings,

    /// Schema lifecycle configuration
    #[serde(default)]
    pub schema: SchemaSettings,

    /// Local state configuration
    #[serde(default)]
    pub state: StateSettings,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Override defaults with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: SEARCH_SYNC)
            .add_source(
                config::Environment::with_prefix("SEARCH_SYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    /// Whether the scheduled recovery loop runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before the first scheduled run (milliseconds)
    #[serde(default = "default_recovery_delay_ms")]
    pub initial_delay_ms: u64,

    /// Delay between runs (milliseconds)
    #[serde(default = "default_recovery_delay_ms")]
    pub delay_ms: u64,

    /// Minimum queue-row age before recovery picks it up (milliseconds)
    #[serde(default = "default_recovery_delay_ms")]
    pub min_age_ms: u64,

    /// Max items handed to an indexer in one call within a run
    #[serde(default = "default_loop_limit")]
    pub loop_limit: usize,
}

impl RecoverySettings {
    pub fn to_recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            enabled: self.enabled,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            delay: Duration::from_millis(self.delay_ms),
            min_age: Duration::from_millis(self.min_age_ms),
            loop_limit: self.loop_limit,
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_recovery_delay_ms(),
            delay_ms: default_recovery_delay_ms(),
            min_age_ms: default_recovery_delay_ms(),
            loop_limit: default_loop_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSettings {
    /// Flush threshold in bytes of buffered request size
    #[serde(default = "default_flush_byte_size")]
    pub flush_byte_size: usize,

    /// Refresh the index when a bulk session stops
    #[serde(default = "default_true")]
    pub refresh_on_stop: bool,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            flush_byte_size: default_flush_byte_size(),
            refresh_on_stop: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaSettings {
    /// Forbid destructive index recreation (no-downtime deployments)
    #[serde(default)]
    pub blue_green_enabled: bool,

    /// Source-of-record vendor fingerprint, compared across startups
    pub db_vendor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateSettings {
    /// Path for the embedded database holding queue rows and schema metadata
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_recovery_delay_ms() -> u64 {
    300_000
}

fn default_loop_limit() -> usize {
    10_000
}

fn default_flush_byte_size() -> usize {
    DEFAULT_FLUSH_BYTE_SIZE
}
