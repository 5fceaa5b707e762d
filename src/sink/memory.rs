//! In-memory sink that records everything it receives.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::collector::MetricSample;
use crate::schema::ChartDefinition;
use crate::sink::{Event, Sink, log_event};

/// One recorded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub job_id: String,
    pub chart_id: String,
    pub sample: MetricSample,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Recorded {
    definitions: Vec<ChartDefinition>,
    submissions: Vec<Submission>,
    events: Vec<Event>,
}

/// Sink that keeps definitions, submissions and events in memory.
///
/// Useful for embedding the engine in a process that renders on its own, and
/// for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    recorded: Mutex<Recorded>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every definition in the order received.
    pub fn definitions(&self) -> Vec<ChartDefinition> {
        self.lock().definitions.clone()
    }

    /// Latest definition received for a chart.
    pub fn definition(&self, chart_id: &str) -> Option<ChartDefinition> {
        self.lock()
            .definitions
            .iter()
            .rev()
            .find(|c| c.id == chart_id)
            .cloned()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    /// Submissions of one job.
    pub fn submissions_for(&self, job_id: &str) -> Vec<Submission> {
        self.lock()
            .submissions
            .iter()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }
}

impl Sink for MemorySink {
    fn define(&self, chart: &ChartDefinition) {
        self.lock().definitions.push(chart.clone());
    }

    fn submit(&self, job_id: &str, chart_id: &str, sample: &MetricSample, ts: DateTime<Utc>) {
        self.lock().submissions.push(Submission {
            job_id: job_id.to_owned(),
            chart_id: chart_id.to_owned(),
            sample: sample.clone(),
            ts,
        });
    }

    fn emit(&self, event: Event) {
        log_event(&event);
        self.lock().events.push(event);
    }
}
