//! Resolved per-job scheduling parameters.

use std::time::Duration;

/// Minimum allowed interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default collection interval (1 second).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-cycle deadline (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of consecutive failures before a job is disabled.
pub const DEFAULT_RETRIES: u32 = 60;

/// Default job priority.
pub const DEFAULT_PRIORITY: i64 = 60_000;

/// Scheduling parameters of one job.
///
/// Loading and parsing live in [`crate::config`]; the engine only needs this
/// resolved form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Job id, unique per scheduler. Used as the chart type prefix.
    pub name: String,
    /// Time between cycles.
    pub interval: Duration,
    /// Hard deadline for each `check`/`collect` call.
    pub timeout: Duration,
    /// Consecutive failures tolerated before the job is disabled.
    pub retries: u32,
    /// Dispatch order among simultaneously due jobs; lower goes first.
    pub priority: i64,
    /// Start the first collection on a wall-clock multiple of the interval.
    pub align_to_interval: bool,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            priority: DEFAULT_PRIORITY,
            align_to_interval: false,
        }
    }

    /// Set the collection interval.
    ///
    /// Interval is clamped to a minimum of 1 second.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(job = %self.name, min_interval = ?MIN_INTERVAL,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            self.interval = MIN_INTERVAL;
        } else {
            self.interval = interval;
        }
        self
    }

    /// Set the per-cycle deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    ///
    /// A budget of zero would disable a job before it could fail; it is clamped to 1.
    pub fn with_retries(mut self, retries: u32) -> Self {
        if retries == 0 {
            tracing::warn!(job = %self.name, "Retry budget of 0 is not allowed. Using 1.");
        }
        self.retries = retries.max(1);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_alignment(mut self, align: bool) -> Self {
        self.align_to_interval = align;
        self
    }

    /// Re-apply the interval and retry floors to a config that may have been
    /// built field by field.
    pub(crate) fn clamped(self) -> Self {
        let (interval, retries) = (self.interval, self.retries);
        self.with_interval(interval).with_retries(retries)
    }

    /// Interval in whole seconds, as charts advertise it.
    pub fn update_every(&self) -> u64 {
        self.interval.as_secs().max(1)
    }
}
