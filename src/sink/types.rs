//! Operator-facing event types.
//!
//! - [`Event`]: structured record of a job lifecycle change
//! - [`EventKind`]: classification of event nature/handling
//! - [`EventSeverity`]: priority levels for event delivery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A discrete occurrence reported to the operator.
///
/// Jobs emit one `Error`/`Critical` event when they are disabled; the
/// scheduler emits `System` events on start and shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event timestamp (UTC).
    pub ts: DateTime<Utc>,
    /// Event origin (e.g. `"job.redis_local"`, `"scheduler"`).
    pub source: String,
    /// Event nature/handling class.
    pub kind: EventKind,
    /// Delivery priority/urgency.
    pub severity: EventSeverity,
    /// Short human-readable description.
    pub message: String,
    /// Context snapshot as JSON.
    pub payload: Option<serde_json::Value>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(
        source: impl Into<String>,
        kind: EventKind,
        severity: EventSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            source: source.into(),
            kind,
            severity,
            message: message.into(),
            payload: None,
        }
    }

    /// Attach a JSON payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Event kind classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventKind {
    /// Job could not start (failed check, bad parameters).
    Configuration,
    /// Job gave up after exhausting its retry budget.
    Error,
    /// Internal system event (e.g. startup, shutdown).
    System,
}

/// Event severity classification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventSeverity {
    /// Verbose diagnostic information.
    Debug,
    /// Normal operational information.
    Info,
    /// Potential issue that may require attention.
    Warn,
    /// Error condition requiring investigation.
    Error,
    /// Severe failure requiring immediate action.
    Critical,
}
