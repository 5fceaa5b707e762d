//! Output sink capability.

use chrono::{DateTime, Utc};

use crate::collector::MetricSample;
use crate::schema::ChartDefinition;
use crate::sink::{Event, EventSeverity};

/// Receiver of chart definitions, metric batches and operator events.
///
/// Implementations must not block the caller for long: buffer internally or
/// drop. The engine never retries a submission.
pub trait Sink: Send + Sync + 'static {
    /// A chart was registered or gained dimensions.
    ///
    /// Always called before the first submission that relies on the new
    /// definition.
    fn define(&self, chart: &ChartDefinition);

    /// One chart's slice of a successful cycle. Values are raw; scaling is
    /// the sink's business.
    fn submit(&self, job_id: &str, chart_id: &str, sample: &MetricSample, ts: DateTime<Utc>);

    /// Operator-facing event. Logged by default.
    fn emit(&self, event: Event) {
        log_event(&event);
    }
}

/// Log an event at the level matching its severity.
pub fn log_event(event: &Event) {
    let payload = event
        .payload
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    match event.severity {
        EventSeverity::Debug => {
            tracing::debug!(source = %event.source, kind = %event.kind, %payload, "{}", event.message)
        }
        EventSeverity::Info => {
            tracing::info!(source = %event.source, kind = %event.kind, %payload, "{}", event.message)
        }
        EventSeverity::Warn => {
            tracing::warn!(source = %event.source, kind = %event.kind, %payload, "{}", event.message)
        }
        EventSeverity::Error | EventSeverity::Critical => {
            tracing::error!(source = %event.source, kind = %event.kind, %payload, "{}", event.message)
        }
    }
}
