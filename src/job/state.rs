//! Per-job retry state machine.
//!
//! ```text
//! UNCHECKED --check ok--> PENDING --dispatch--> RUNNING --ok--> PENDING
//!     |                      ^                     |
//!     +--check failed--+     +---failure, budget---+
//!                      v                           |
//!                   DISABLED <--budget exhausted---+
//! ```
//!
//! All transitions are pure functions of the current state and the clock value
//! passed in, so they can be exercised without running a scheduler.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tokio::time::Instant;

/// Why a cycle or a job failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// No data this cycle; retried per job policy.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Deadline exceeded; accounted like a transient failure.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Job cannot start (failed check, missing parameter).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Consecutive failures reached the retry budget.
    #[error("retries exhausted after {attempts} consecutive failures, last: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl JobError {
    /// Whether this error is surfaced to the operator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::RetriesExhausted { .. })
    }
}

/// Lifecycle position of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    /// Registered; `check` has not run yet.
    Unchecked,
    /// Waiting in the queue for its due time.
    Pending,
    /// A cycle is in flight.
    Running,
    /// Terminal; no further cycles.
    Disabled,
}

/// Result of a failed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Retry at the given time.
    Retry(Instant),
    /// Budget exhausted; the job is now disabled.
    Disabled(JobError),
}

/// Next due time after a successful cycle.
///
/// Drift-corrected: advances from the previous due time by whole intervals,
/// never from `now`. When the cycle overran several intervals the missed slots
/// are skipped so that at most one slot is overdue. Returns the new due time
/// and the number of skipped slots. A zero interval yields `now`.
pub fn next_due_after_success(due: Instant, interval: Duration, now: Instant) -> (Instant, u32) {
    let next = due + interval;
    let step = interval.as_nanos();
    if step == 0 {
        return (next.max(now), 0);
    }
    let skipped = now.saturating_duration_since(next).as_nanos() / step;
    let advance = Duration::from_nanos(u64::try_from(skipped * step).unwrap_or(u64::MAX));
    (next + advance, u32::try_from(skipped).unwrap_or(u32::MAX))
}

/// Next due time after a failed cycle: the normal cadence from now.
pub fn next_due_after_failure(interval: Duration, now: Instant) -> Instant {
    now + interval
}

/// Mutable state owned by one job.
#[derive(Debug, Clone)]
pub struct JobState {
    status: JobStatus,
    retries: u32,
    failure_streak: u32,
    next_due: Instant,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<JobError>,
}

impl JobState {
    /// Fresh state; the check is due at `now`.
    pub fn new(retries: u32, now: Instant) -> Self {
        Self {
            status: JobStatus::Unchecked,
            retries: retries.max(1),
            failure_streak: 0,
            next_due: now,
            last_success: None,
            last_failure: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retries.saturating_sub(self.failure_streak)
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn last_failure(&self) -> Option<&JobError> {
        self.last_failure.as_ref()
    }

    pub fn is_disabled(&self) -> bool {
        self.status == JobStatus::Disabled
    }

    /// Check passed; first collection due at `first_due`.
    pub fn checked(&mut self, first_due: Instant) {
        debug_assert_eq!(self.status, JobStatus::Unchecked);
        self.status = JobStatus::Pending;
        self.next_due = first_due;
    }

    /// Check failed; the job never runs.
    pub fn check_failed(&mut self, reason: String) -> JobError {
        let err = JobError::Configuration(reason);
        self.status = JobStatus::Disabled;
        self.last_failure = Some(err.clone());
        err
    }

    /// A cycle was dispatched.
    pub fn begin(&mut self) {
        self.status = JobStatus::Running;
    }

    /// Cycle succeeded. Returns the number of skipped slots.
    pub fn succeed(&mut self, interval: Duration, now: Instant) -> u32 {
        let (next, skipped) = next_due_after_success(self.next_due, interval, now);
        self.failure_streak = 0;
        self.next_due = next;
        self.last_success = Some(Utc::now());
        self.status = JobStatus::Pending;
        skipped
    }

    /// Cycle failed.
    pub fn fail(&mut self, error: JobError, interval: Duration, now: Instant) -> Transition {
        self.failure_streak += 1;
        self.last_failure = Some(error.clone());

        if self.failure_streak >= self.retries {
            self.status = JobStatus::Disabled;
            return Transition::Disabled(JobError::RetriesExhausted {
                attempts: self.failure_streak,
                last: error.to_string(),
            });
        }

        self.next_due = next_due_after_failure(interval, now);
        self.status = JobStatus::Pending;
        Transition::Retry(self.next_due)
    }
}
