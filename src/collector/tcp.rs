//! TCP connect probe.
//!
//! Reports connect latency and the outcome of each attempt. A refused or
//! timed out connection is an observation, so the cycle still succeeds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::collector::{Collector, CollectorError, MetricSample};
use crate::config::JobOverrides;
use crate::schema::{ChartMetadata, ChartTemplate, ChartType, DimensionDefinition};

/// Module name used in chart contexts.
pub const MODULE: &str = "tcp";

/// Time reserved before the job deadline so a slow connect is reported as
/// `timeout` instead of failing the cycle.
const DEADLINE_MARGIN: Duration = Duration::from_millis(50);

fn default_enabled() -> bool {
    true
}

/// Configuration for a TCP probe job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Unique job name.
    pub name: String,
    /// Target host (hostname or IP address).
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Enable this job (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scheduling overrides.
    #[serde(flatten)]
    pub job: JobOverrides,
}

impl TcpConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            enabled: true,
            job: JobOverrides::default(),
        }
    }

    /// `host:port` string handed to the resolver.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
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

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.job.retries = Some(retries);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.job.priority = Some(priority);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// TCP connect probe collector.
#[derive(Debug)]
pub struct TcpCollector {
    config: TcpConfig,
}

impl TcpCollector {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Collector for TcpCollector {
    fn name(&self) -> &str {
        MODULE
    }

    fn charts(&self) -> Vec<ChartTemplate> {
        vec![
            ChartTemplate::new(
                "latency",
                ChartMetadata::new("TCP connect latency", "ms")
                    .with_family("latency")
                    .with_context("tcp.latency"),
            )
            // Reported in microseconds.
            .with_dimension(DimensionDefinition::new("latency").with_scale(1, 1000)),
            ChartTemplate::new(
                "status",
                ChartMetadata::new("TCP connect status", "status")
                    .with_family("status")
                    .with_context("tcp.status")
                    .with_chart_type(ChartType::Stacked),
            )
            .with_dimension(DimensionDefinition::new("success"))
            .with_dimension(DimensionDefinition::new("failed"))
            .with_dimension(DimensionDefinition::new("timeout")),
        ]
    }

    async fn check(&self) -> bool {
        if self.config.host.trim().is_empty() || self.config.port == 0 {
            tracing::error!(job = %self.config.name, "TCP probe needs a host and a non-zero port");
            return false;
        }
        match tokio::net::lookup_host(self.config.target()).await {
            Ok(mut addrs) => {
                let found = addrs.next().is_some();
                if !found {
                    tracing::error!(job = %self.config.name, target = %self.config.target(), "Target resolved to no address");
                }
                found
            }
            Err(e) => {
                tracing::error!(job = %self.config.name, target = %self.config.target(), error = %e, "Cannot resolve target");
                false
            }
        }
    }

    async fn collect(&self, deadline: Instant) -> Result<MetricSample, CollectorError> {
        let target = self.config.target();
        let start = Instant::now();
        let probe_deadline = deadline
            .checked_sub(DEADLINE_MARGIN)
            .filter(|d| *d > start)
            .unwrap_or(deadline);

        let result = tokio::time::timeout_at(probe_deadline, TcpStream::connect(&target)).await;
        let elapsed = start.elapsed();

        let sample = match result {
            Ok(Ok(_stream)) => {
                let micros = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
                tracing::debug!(job = %self.config.name, target = %target, latency_us = micros, "TCP probe successful");
                MetricSample::new()
                    .with("latency", micros)
                    .with("success", 1_i64)
                    .with("failed", 0_i64)
                    .with("timeout", 0_i64)
            }
            Ok(Err(e)) => {
                tracing::debug!(job = %self.config.name, target = %target, error = %e, "TCP probe failed");
                MetricSample::new()
                    .with("success", 0_i64)
                    .with("failed", 1_i64)
                    .with("timeout", 0_i64)
            }
            Err(_) => {
                tracing::debug!(job = %self.config.name, target = %target, elapsed = ?elapsed, "TCP probe timed out");
                MetricSample::new()
                    .with("success", 0_i64)
                    .with("failed", 0_i64)
                    .with("timeout", 1_i64)
            }
        };
        Ok(sample)
    }
}
