//! Core collector trait and errors.

use thiserror::Error;
use tokio::time::Instant;

use crate::collector::MetricSample;
use crate::schema::{ChartTemplate, Placement};

/// Chart used for unseen metrics when a collector declares no charts.
pub const FALLBACK_CHART: &str = "metrics";

/// Errors a collector reports instead of a sample.
///
/// Every variant means "no data this cycle"; none of them mark the collector
/// as permanently broken. Retry accounting is done by the job.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Network I/O error.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Timeout elapsed.
    #[error("timeout elapsed")]
    Timeout,

    /// Reply could not be parsed.
    #[error("invalid reply: {0}")]
    Parse(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Source answered but had nothing to report.
    #[error("no data: {0}")]
    NoData(String),
}

/// Vendor-specific data source behind a job.
///
/// The engine treats collectors as opaque: it calls [`check`](Self::check) once,
/// then [`collect`](Self::collect) every cycle, and maps the returned keys into
/// charts. Reconnect logic belongs inside `collect`; a collector may reconnect
/// before giving up with an error.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Module name (e.g. `"tcp"`), used in logs and events.
    fn name(&self) -> &str;

    /// Static chart templates, built fresh for this instance.
    fn charts(&self) -> Vec<ChartTemplate> {
        Vec::new()
    }

    /// Route a metric that no declared dimension covers.
    ///
    /// Returning `None` places it as an absolute dimension into the first
    /// declared chart, or into [`FALLBACK_CHART`].
    fn place(&self, metric: &str) -> Option<Placement> {
        let _ = metric;
        None
    }

    /// One-time feasibility probe (connectivity, auth, required parameters).
    async fn check(&self) -> bool {
        true
    }

    /// Perform one collection cycle.
    ///
    /// Implementations should finish before `deadline`; the job aborts the call
    /// once it passes and counts the cycle as failed.
    async fn collect(&self, deadline: Instant) -> Result<MetricSample, CollectorError>;
}
