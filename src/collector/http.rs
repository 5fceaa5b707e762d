//! JSON endpoint collector.
//!
//! Fetches a JSON document and reports every numeric or boolean leaf as a
//! dimension. Nested keys are joined with `_`, so `{"db": {"keys": 3}}`
//! becomes `db_keys`. Dimensions are discovered on the fly; keys listed in
//! `incremental` are charted as rates.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::time::Instant;

use crate::collector::{Collector, CollectorError, MetricSample};
use crate::config::{JobOverrides, expand_env_vars};
use crate::schema::{ChartMetadata, ChartTemplate, DimensionDefinition, Placement};

/// Module name used in chart contexts.
pub const MODULE: &str = "http";

/// Default expected HTTP status code.
const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Chart receiving every discovered key.
const VALUES_CHART: &str = "values";

fn default_enabled() -> bool {
    true
}

fn default_expected_status() -> u16 {
    DEFAULT_EXPECTED_STATUS
}

fn default_units() -> String {
    "value".to_string()
}

/// HTTP method for requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Configuration for a JSON endpoint job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpJsonConfig {
    /// Unique job name.
    pub name: String,
    /// Endpoint URL (HTTP or HTTPS).
    pub url: String,
    /// Enable this job (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// HTTP method to use (default: GET).
    #[serde(default)]
    pub method: HttpMethod,
    /// Expected HTTP status code (default: 200).
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Request headers; values support `${VAR}` and `${VAR:-default}`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body sent with POST.
    #[serde(default)]
    pub body: Option<String>,
    /// Flattened keys charted as incremental dimensions.
    #[serde(default)]
    pub incremental: Vec<String>,
    /// Chart title (default: the URL).
    #[serde(default)]
    pub title: Option<String>,
    /// Chart units (default: "value").
    #[serde(default = "default_units")]
    pub units: String,
    /// Scheduling overrides.
    #[serde(flatten)]
    pub job: JobOverrides,
}

impl HttpJsonConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            method: HttpMethod::default(),
            expected_status: DEFAULT_EXPECTED_STATUS,
            headers: BTreeMap::new(),
            body: None,
            incremental: Vec::new(),
            title: None,
            units: default_units(),
            job: JobOverrides::default(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Add a single request header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Chart `key` as an incremental dimension.
    pub fn with_incremental(mut self, key: impl Into<String>) -> Self {
        self.incremental.push(key.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    /// Set the collection interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.job.interval = Some(interval);
        self
    }

    /// Set the per-cycle deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job.timeout = Some(timeout);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// JSON endpoint collector.
pub struct HttpJsonCollector {
    config: HttpJsonConfig,
    headers: HeaderMap,
    client: Client,
}

impl HttpJsonCollector {
    /// Create a collector, expanding environment variables in header values.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if a header is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: HttpJsonConfig) -> Result<Self, CollectorError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| CollectorError::Config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(&expand_env_vars(value))
                .map_err(|e| CollectorError::Config(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            headers,
            client,
        })
    }

    async fn fetch(&self) -> Result<MetricSample, CollectorError> {
        let mut request = match self.config.method {
            HttpMethod::Get => self.client.get(&self.config.url),
            HttpMethod::Post => self.client.post(&self.config.url),
        }
        .headers(self.headers.clone());
        if let (HttpMethod::Post, Some(body)) = (self.config.method, &self.config.body) {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if status != self.config.expected_status {
            return Err(CollectorError::Parse(format!(
                "{} {}: unexpected status {status}, expected {}",
                self.config.method, self.config.url, self.config.expected_status
            )));
        }

        let body: Value = response.json().await?;
        if !body.is_object() {
            return Err(CollectorError::Parse(
                "response body is not a JSON object".to_string(),
            ));
        }
        Ok(flatten_json(&body))
    }
}

impl std::fmt::Debug for HttpJsonCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJsonCollector")
            .field("name", &self.config.name)
            .field("url", &self.config.url)
            .field("method", &self.config.method)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Collector for HttpJsonCollector {
    fn name(&self) -> &str {
        MODULE
    }

    fn charts(&self) -> Vec<ChartTemplate> {
        let title = self
            .config
            .title
            .clone()
            .unwrap_or_else(|| self.config.url.clone());
        vec![ChartTemplate::new(
            VALUES_CHART,
            ChartMetadata::new(title, self.config.units.clone())
                .with_family(self.config.name.clone())
                .with_context("http.values"),
        )]
    }

    fn place(&self, metric: &str) -> Option<Placement> {
        self.config
            .incremental
            .iter()
            .any(|k| k == metric)
            .then(|| Placement::new(VALUES_CHART, DimensionDefinition::incremental(metric)))
    }

    async fn check(&self) -> bool {
        match self.fetch().await {
            Ok(sample) if !sample.is_empty() => true,
            Ok(_) => {
                tracing::error!(job = %self.config.name, url = %self.config.url, "Endpoint returned no numeric values");
                false
            }
            Err(e) => {
                tracing::error!(job = %self.config.name, url = %self.config.url, error = %e, "Endpoint check failed");
                false
            }
        }
    }

    async fn collect(&self, deadline: Instant) -> Result<MetricSample, CollectorError> {
        tokio::time::timeout_at(deadline, self.fetch())
            .await
            .map_err(|_| CollectorError::Timeout)?
    }
}

/// Flatten the numeric and boolean leaves of a JSON document.
///
/// Object keys and array indices are joined with `_`; characters that are
/// not valid in a dimension id become `_`. Strings and nulls are skipped.
pub fn flatten_json(value: &Value) -> MetricSample {
    let mut sample = MetricSample::new();
    flatten_into(value, String::new(), &mut sample);
    sample
}

fn flatten_into(value: &Value, key: String, sample: &mut MetricSample) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(v, join_key(&key, k), sample);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(v, join_key(&key, &i.to_string()), sample);
            }
        }
        Value::Number(n) if !key.is_empty() => {
            if let Some(i) = n.as_i64() {
                sample.insert(key, i);
            } else if let Some(f) = n.as_f64() {
                sample.insert(key, f);
            }
        }
        Value::Bool(b) if !key.is_empty() => sample.insert(key, *b),
        _ => {}
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if prefix.is_empty() {
        key
    } else {
        format!("{prefix}_{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Algorithm;
    use serde_json::json;
    use std::io::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response per connection.
    async fn serve(status: &'static str, body: &'static str) -> Option<String> {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return None,
            Err(e) => panic!("Failed to bind test listener: {e}"),
        };
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0_u8; 4096];
                let _ = stream.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
            }
        });
        Some(format!("http://{addr}/stats"))
    }

    #[test]
    fn test_flatten_json() {
        let doc = json!({
            "uptime": 120,
            "ratio": 0.5,
            "ready": true,
            "name": "ignored",
            "db": {"keys": 3, "expires": null},
            "queues": [4, {"depth": 2}],
            "hit rate": 7
        });
        let sample = flatten_json(&doc);

        let names: Vec<_> = sample.names().collect();
        assert_eq!(
            names,
            vec![
                "db_keys",
                "hit_rate",
                "queues_0",
                "queues_1_depth",
                "ratio",
                "ready",
                "uptime"
            ]
        );
        assert_eq!(sample.get("ready").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(sample.get("ratio").map(|v| v.as_f64()), Some(0.5));
    }

    #[test]
    fn test_http_config_from_yaml() {
        let yaml = r#"
name: api
url: http://127.0.0.1:8080/stats
method: POST
body: "{}"
incremental: [requests]
timeout: 2s
"#;
        let config: HttpJsonConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.expected_status, DEFAULT_EXPECTED_STATUS);
        assert_eq!(config.units, "value");
        assert_eq!(config.incremental, vec!["requests".to_string()]);
        assert_eq!(config.job.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_http_method_from_str() {
        assert_eq!("get".parse::<HttpMethod>().ok(), Some(HttpMethod::Get));
        assert_eq!("POST".parse::<HttpMethod>().ok(), Some(HttpMethod::Post));
        assert!("PATCH".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Post.as_ref(), "POST");
        assert_eq!(HttpMethod::Get.to_string(), "GET");
    }

    #[test]
    fn test_place_incremental_keys() {
        let config = HttpJsonConfig::new("api", "http://localhost/").with_incremental("requests");
        let collector = HttpJsonCollector::new(config).unwrap();

        let placement = collector.place("requests").unwrap();
        assert_eq!(placement.chart, VALUES_CHART);
        assert_eq!(placement.dimension.algorithm, Algorithm::Incremental);
        assert!(collector.place("uptime").is_none());
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = HttpJsonConfig::new("api", "http://localhost/").with_header("bad header", "x");
        assert!(matches!(
            HttpJsonCollector::new(config),
            Err(CollectorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_collect_from_endpoint() {
        let Some(url) = serve("200 OK", r#"{"requests": 42, "pool": {"idle": 3}}"#).await else {
            return;
        };
        let collector = HttpJsonCollector::new(HttpJsonConfig::new("api", url)).unwrap();
        assert!(collector.check().await);

        let sample = collector
            .collect(Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(sample.get("requests").and_then(|v| v.as_i64()), Some(42));
        assert_eq!(sample.get("pool_idle").and_then(|v| v.as_i64()), Some(3));
    }

    #[tokio::test]
    async fn test_unexpected_status_is_failure() {
        let Some(url) = serve("503 Service Unavailable", r#"{"requests": 1}"#).await else {
            return;
        };
        let collector = HttpJsonCollector::new(HttpJsonConfig::new("api", url)).unwrap();
        let err = collector
            .collect(Instant::now() + Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unexpected status 503"));
        assert!(!collector.check().await);
    }

    #[tokio::test]
    async fn test_non_object_body_is_failure() {
        let Some(url) = serve("200 OK", "[1, 2]").await else {
            return;
        };
        let collector = HttpJsonCollector::new(HttpJsonConfig::new("api", url)).unwrap();
        assert!(
            collector
                .collect(Instant::now() + Duration::from_secs(5))
                .await
                .is_err()
        );
    }
}
