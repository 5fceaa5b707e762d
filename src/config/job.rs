//! Module-level job defaults and per-job overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::{DEFAULT_INTERVAL, DEFAULT_PRIORITY, DEFAULT_RETRIES, DEFAULT_TIMEOUT, JobConfig};

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

fn default_align() -> bool {
    true
}

/// Scheduling defaults applied to every job that does not override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefaults {
    /// Collection interval (default: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Per-cycle deadline (default: 5s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Consecutive failures before a job is disabled (default: 60).
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Base chart priority (default: 60000).
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Align the first collection to a wall-clock multiple of the interval.
    #[serde(default = "default_align")]
    pub align_to_interval: bool,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            priority: DEFAULT_PRIORITY,
            align_to_interval: true,
        }
    }
}

/// Optional scheduling overrides carried by a collector entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOverrides {
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl JobOverrides {
    /// Resolve the job's scheduling parameters against module defaults.
    pub fn resolve(&self, name: &str, defaults: &JobDefaults) -> JobConfig {
        JobConfig::new(name)
            .with_interval(self.interval.unwrap_or(defaults.interval))
            .with_timeout(self.timeout.unwrap_or(defaults.timeout))
            .with_retries(self.retries.unwrap_or(defaults.retries))
            .with_priority(self.priority.unwrap_or(defaults.priority))
            .with_alignment(defaults.align_to_interval)
    }
}
