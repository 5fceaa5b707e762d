//! Configuration module for chartpoll.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Module-level job defaults (interval, timeout, retries, priority)
//! - Plugin output settings
//! - Collector jobs and the optional include directory

mod app;
mod collector;
mod job;
mod validation;

pub use app::{AppConfig, OutputConfig};
pub use collector::CollectorsConfig;
pub use job::{JobDefaults, JobOverrides};
pub use validation::{ConfigError, expand_env_vars, parse_duration, parse_update_every};
