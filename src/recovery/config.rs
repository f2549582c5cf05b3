//! Configuration for the recovery loop

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the recovery scheduler and indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Whether the scheduled loop is enabled
    pub enabled: bool,

    /// Delay before the first scheduled run
    pub initial_delay: Duration,

    /// Delay between the end of one run and the start of the next
    pub delay: Duration,

    /// Minimum row age before a row is eligible for recovery; guards against
    /// reconciling a document whose owning transaction has not committed yet
    pub min_age: Duration,

    /// Maximum items handed to an indexer in one call within a run
    pub loop_limit: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(300_000),
            delay: Duration::from_millis(300_000),
            min_age: Duration::from_millis(300_000),
            loop_limit: 10_000,
        }
    }
}

/// Builder for RecoveryConfig
pub struct RecoveryConfigBuilder {
    config: RecoveryConfig,
}

impl RecoveryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RecoveryConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn min_age(mut self, min_age: Duration) -> Self {
        self.config.min_age = min_age;
        self
    }

    pub fn loop_limit(mut self, loop_limit: usize) -> Self {
        self.config.loop_limit = loop_limit;
        self
    }

    pub fn build(self) -> RecoveryConfig {
        self.config
    }
}

impl Default for RecoveryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
