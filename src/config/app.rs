//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobConfig;
use crate::sink::DEFAULT_CHANNEL_CAPACITY;

use super::collector::CollectorsConfig;
use super::job::{JobDefaults, JobOverrides};
use super::validation::ConfigError;

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

// =============================================================================
// Output Configuration
// =============================================================================

/// Plugin protocol output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Bounded channel capacity between jobs and the writer thread (default: 1024).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduling defaults for every job.
    #[serde(default)]
    pub defaults: JobDefaults,

    /// Plugin output configuration.
    #[serde(default)]
    pub output: OutputConfig,

    /// Collector jobs grouped by type.
    #[serde(default)]
    pub collectors: CollectorsConfig,

    /// Path to a directory with additional collector config files.
    #[serde(default)]
    pub collector_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "defaults.interval must be positive".to_string(),
            ));
        }
        if self.defaults.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "defaults.timeout must be positive".to_string(),
            ));
        }
        if self.defaults.retries == 0 {
            return Err(ConfigError::Invalid(
                "defaults.retries must be at least 1".to_string(),
            ));
        }
        if self.output.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "output channel_capacity must be positive".to_string(),
            ));
        }

        self.collectors.validate()?;

        Ok(())
    }

    /// Load configuration including collector_path directory.
    ///
    /// If `collector_path` is specified, scans the directory for YAML files
    /// and merges their collector configurations.
    pub fn load_with_collector_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        let collector_path = config.collector_path.clone();
        config.merge_collector_path(collector_path.as_deref())
    }

    /// Merge the jobs found in `dir` (if any) and revalidate.
    pub fn merge_collector_path(mut self, dir: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(dir) = dir {
            let additional = CollectorsConfig::load_from_dir(dir)?;
            self.collectors = self.collectors.merge(additional);
        }
        self.validate()?;
        Ok(self)
    }

    /// Override the default interval, as the `update_every` argument does.
    #[must_use]
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.defaults.interval = interval;
        self
    }

    /// Resolve a job's scheduling parameters against the defaults.
    pub fn job_config(&self, name: &str, overrides: &JobOverrides) -> JobConfig {
        overrides.resolve(name, &self.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tcp::TcpConfig;
    use crate::job::{DEFAULT_PRIORITY, DEFAULT_RETRIES};

    const SAMPLE: &str = r#"
defaults:
  interval: 5s
  retries: 10
output:
  channel_capacity: 64
collectors:
  tcp:
    - name: redis
      host: 127.0.0.1
      port: 6379
      interval: 30s
    - name: postgres
      host: 127.0.0.1
      port: 5432
      enabled: false
  http:
    - name: api
      url: http://127.0.0.1:8080/stats
      headers:
        Authorization: "Bearer ${API_TOKEN:-none}"
      incremental: [requests]
"#;

    #[test]
    fn test_app_config_from_yaml() {
        let config: AppConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.defaults.interval, Duration::from_secs(5));
        assert_eq!(config.defaults.priority, DEFAULT_PRIORITY);
        assert_eq!(config.output.channel_capacity, 64);
        assert_eq!(config.collectors.len(), 3);
        assert!(!config.collectors.tcp[1].enabled);

        let redis = config.job_config("redis", &config.collectors.tcp[0].job);
        assert_eq!(redis.interval, Duration::from_secs(30));
        assert_eq!(redis.retries, 10);

        let api = config.job_config("api", &config.collectors.http[0].job);
        assert_eq!(api.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_app_config_empty_document() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.defaults.retries, DEFAULT_RETRIES);
        assert_eq!(config.output.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.collectors.is_empty());
    }

    #[test]
    fn test_config_validation_invalid_channel_capacity() {
        let config = AppConfig {
            output: OutputConfig {
                channel_capacity: 0,
            },
            ..AppConfig::default()
        };

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("channel_capacity must be positive")
        );
    }

    #[test]
    fn test_config_validation_invalid_defaults() {
        let mut config = AppConfig::default();
        config.defaults.retries = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.defaults.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_update_every_overrides_default_interval() {
        let mut config = AppConfig::default();
        config
            .collectors
            .tcp
            .push(TcpConfig::new("redis", "127.0.0.1", 6379));
        let config = config.with_default_interval(Duration::from_secs(10));

        let job = config.job_config("redis", &config.collectors.tcp[0].job);
        assert_eq!(job.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_load_with_collector_path() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("collectors.d");
        std::fs::create_dir(&extra).unwrap();
        std::fs::write(
            extra.join("web.yaml"),
            "tcp:\n  - name: web\n    host: 127.0.0.1\n    port: 80\n",
        )
        .unwrap();

        let main = dir.path().join("chartpoll.yaml");
        std::fs::write(
            &main,
            format!(
                "collector_path: {}\ncollectors:\n  tcp:\n    - name: redis\n      host: 127.0.0.1\n      port: 6379\n",
                extra.display()
            ),
        )
        .unwrap();

        let config = AppConfig::load_with_collector_path(&main).unwrap();
        let names: Vec<_> = config.collectors.tcp.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["redis", "web"]);
    }

    #[test]
    fn test_load_with_collector_path_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dup.yaml"),
            "tcp:\n  - name: redis\n    host: 127.0.0.1\n    port: 6380\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config
            .collectors
            .tcp
            .push(TcpConfig::new("redis", "127.0.0.1", 6379));
        let err = config
            .merge_collector_path(dir.path().to_str())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
