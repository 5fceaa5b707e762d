//! Collector configuration structures.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::http::HttpJsonConfig;
use crate::collector::tcp::TcpConfig;

use super::job::JobOverrides;
use super::validation::ConfigError;

/// Collectors configuration grouped by type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// TCP connect probes.
    #[serde(default)]
    pub tcp: Vec<TcpConfig>,

    /// JSON endpoint collectors.
    #[serde(default)]
    pub http: Vec<HttpJsonConfig>,
}

impl CollectorsConfig {
    /// Merge another CollectorsConfig into this one.
    #[must_use]
    pub fn merge(mut self, other: CollectorsConfig) -> Self {
        self.tcp.extend(other.tcp);
        self.http.extend(other.http);
        self
    }

    /// Number of configured jobs, enabled or not.
    pub fn len(&self) -> usize {
        self.tcp.len() + self.http.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate all collector configurations.
    ///
    /// Job names are unique across collector types because they become
    /// chart id prefixes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_names = HashSet::new();

        for tcp in &self.tcp {
            validate_name("tcp", &tcp.name, &mut seen_names)?;
            if tcp.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "tcp collector '{}': host cannot be empty",
                    tcp.name
                )));
            }
            if tcp.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "tcp collector '{}': port must be non-zero",
                    tcp.name
                )));
            }
            validate_overrides("tcp", &tcp.name, &tcp.job)?;
        }

        for http in &self.http {
            validate_name("http", &http.name, &mut seen_names)?;
            let url = url::Url::parse(&http.url).map_err(|e| {
                ConfigError::Invalid(format!(
                    "http collector '{}': invalid URL '{}': {}",
                    http.name, http.url, e
                ))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Invalid(format!(
                    "http collector '{}': unsupported URL scheme '{}'",
                    http.name,
                    url.scheme()
                )));
            }
            validate_overrides("http", &http.name, &http.job)?;
        }

        Ok(())
    }

    /// Load collector configurations from all YAML files in a directory.
    pub fn load_from_dir(dir_path: &str) -> Result<Self, ConfigError> {
        let dir = Path::new(dir_path);
        if !dir.exists() {
            return Err(ConfigError::Invalid(format!(
                "collector_path '{}' does not exist",
                dir_path
            )));
        }
        if !dir.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "collector_path '{}' is not a directory",
                dir_path
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext == "yaml" || ext == "yml" {
                paths.push(path);
            }
        }
        // Directory order is unspecified; keep job registration stable.
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!("Loading collector config from: {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let file_config: Self =
                serde_yaml::from_str(&content).map_err(|source| ConfigError::CollectorFile {
                    path: path.clone(),
                    source,
                })?;
            merged = merged.merge(file_config);
        }

        Ok(merged)
    }
}

fn validate_name<'a>(
    kind: &str,
    name: &'a str,
    seen: &mut HashSet<&'a str>,
) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{kind} collector name cannot be empty"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Invalid(format!(
            "{kind} collector name '{name}' may only contain letters, digits, '_' and '-'"
        )));
    }
    if !seen.insert(name) {
        return Err(ConfigError::Invalid(format!(
            "duplicate collector name: '{}'",
            name
        )));
    }
    Ok(())
}

fn validate_overrides(kind: &str, name: &str, job: &JobOverrides) -> Result<(), ConfigError> {
    if job.timeout == Some(Duration::ZERO) {
        return Err(ConfigError::Invalid(format!(
            "{kind} collector '{name}': timeout must be positive"
        )));
    }
    if job.retries == Some(0) {
        return Err(ConfigError::Invalid(format!(
            "{kind} collector '{name}': retries must be at least 1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collectors_config_merge() {
        let config1 = CollectorsConfig {
            tcp: vec![TcpConfig::new("tcp-1", "127.0.0.1", 6379)],
            http: vec![],
        };

        let config2 = CollectorsConfig {
            tcp: vec![TcpConfig::new("tcp-2", "127.0.0.1", 6380)],
            http: vec![HttpJsonConfig::new("api", "http://127.0.0.1:8080/stats")],
        };

        let merged = config1.merge(config2);
        assert_eq!(merged.tcp.len(), 2);
        assert_eq!(merged.http.len(), 1);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_collectors_config_validate_cross_type_duplicate() {
        let config = CollectorsConfig {
            tcp: vec![TcpConfig::new("same-name", "127.0.0.1", 6379)],
            http: vec![HttpJsonConfig::new("same-name", "http://127.0.0.1/")],
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_collectors_config_validate_empty_name() {
        let config = CollectorsConfig {
            tcp: vec![TcpConfig::new("", "127.0.0.1", 6379)],
            http: vec![],
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_collectors_config_validate_name_charset() {
        let config = CollectorsConfig {
            tcp: vec![TcpConfig::new("redis.local", "127.0.0.1", 6379)],
            http: vec![],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_collectors_config_validate_zero_port() {
        let config = CollectorsConfig {
            tcp: vec![TcpConfig::new("redis", "127.0.0.1", 0)],
            http: vec![],
        };
        assert!(config.validate().unwrap_err().to_string().contains("port"));
    }

    #[test]
    fn test_collectors_config_validate_invalid_http_url() {
        let config = CollectorsConfig {
            tcp: vec![],
            http: vec![HttpJsonConfig::new("test", "not-a-valid-url")],
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("invalid URL"));

        let config = CollectorsConfig {
            tcp: vec![],
            http: vec![HttpJsonConfig::new("test", "ftp://example.com/stats")],
        };
        assert!(config.validate().unwrap_err().to_string().contains("scheme"));
    }

    #[test]
    fn test_collectors_config_validate_overrides() {
        let config = CollectorsConfig {
            tcp: vec![TcpConfig::new("redis", "127.0.0.1", 6379).with_retries(0)],
            http: vec![],
        };
        assert!(config.validate().unwrap_err().to_string().contains("retries"));

        let config = CollectorsConfig {
            tcp: vec![TcpConfig::new("redis", "127.0.0.1", 6379).with_timeout(Duration::ZERO)],
            http: vec![],
        };
        assert!(config.validate().unwrap_err().to_string().contains("timeout"));
    }

    #[test]
    fn test_load_from_dir_merges_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "tcp:\n  - name: redis\n    host: 127.0.0.1\n    port: 6379\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.yml"),
            "http:\n  - name: api\n    url: http://127.0.0.1:8080/stats\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = CollectorsConfig::load_from_dir(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.tcp.len(), 1);
        assert_eq!(config.http.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_dir() {
        let err = CollectorsConfig::load_from_dir("/nonexistent/chartpoll.d").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
