//! Runtime configuration schema.
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SarahConfig {
    pub runner: RunnerConfig,
    pub worker: WorkerConfig,
    pub context_cache: ContextCacheConfig,
}

impl SarahConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.runner.time_zone()?;
        if self.worker.worker_num == 0 {
            return Err(Error::message("worker.worker_num must be > 0"));
        }
        Ok(())
    }
}

/// Runner-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// IANA zone name used to evaluate scheduled task expressions.
    pub timezone: String,
    /// Directory containing one sub-directory of plugin config files per bot.
    /// When unset, plugin configs are neither read nor watched.
    pub plugin_config_root: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            plugin_config_root: None,
        }
    }
}

impl RunnerConfig {
    pub fn time_zone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| Error::UnknownTimezone {
                timezone: self.timezone.clone(),
            })
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of long-lived worker tasks.
    pub worker_num: usize,
    /// Jobs that may wait for a free worker before enqueue starts failing.
    pub queue_size: usize,
    /// How often queue depth is reported; `0` disables reporting.
    pub supervise_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_num: 100,
            queue_size: 10,
            supervise_interval_secs: 60,
        }
    }
}

impl WorkerConfig {
    pub fn supervise_interval(&self) -> Option<Duration> {
        (self.supervise_interval_secs > 0).then(|| Duration::from_secs(self.supervise_interval_secs))
    }
}

/// Expiry settings for the in-memory conversational context store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextCacheConfig {
    pub expires_in_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for ContextCacheConfig {
    fn default() -> Self {
        Self {
            expires_in_secs: 3 * 60,
            cleanup_interval_secs: 10 * 60,
        }
    }
}

impl ContextCacheConfig {
    pub fn expires_in(&self) -> Duration {
        Duration::from_secs(self.expires_in_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
