//! Configuration for the store manager.
//!
//! Hierarchical loading with default values as code base, an optional
//! configuration file, and environment variable overrides.

#[cfg(test)]
mod config_test;

use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Configuration for a [`StoreManager`](crate::StoreManager).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Capacity of the bounded channel carrying upstream change
    /// notifications from the backing into the manager loop.
    ///
    /// The loop drains this channel as fast as it can re-fetch and apply
    /// changes; the buffer only absorbs bursts. Slow watchers never hold
    /// it up, so there is rarely a reason to raise this.
    ///
    /// **Default**: 1024
    #[serde(default = "default_change_queue_size")]
    pub change_queue_size: usize,

    /// Emit a `trace!` line for every delta handed to a watcher.
    ///
    /// Useful when debugging delivery order. Adds per-delta overhead.
    ///
    /// **Default**: false
    #[serde(default = "default_log_deltas")]
    pub log_deltas: bool,
}

fn default_change_queue_size() -> usize {
    1024
}

fn default_log_deltas() -> bool {
    false
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            change_queue_size: default_change_queue_size(),
            log_deltas: default_log_deltas(),
        }
    }
}

impl ManagerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order (later overrides earlier):
    /// 1. Type defaults
    /// 2. Configuration file named by the `CONFIG_PATH` environment
    ///    variable, if set
    /// 3. Environment variables with a `MULTIWATCHER__` prefix
    ///
    /// Callers must call [`validate`](Self::validate) before use.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("MULTIWATCHER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validates the configuration and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        if self.change_queue_size == 0 {
            return Err(ConfigError::Message(
                "change_queue_size must be at least 1".to_string(),
            )
            .into());
        }
        Ok(self)
    }
}
