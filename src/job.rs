//! Job Layer
//!
//! A job binds one collector instance to its scheduling parameters and owns the
//! chart state of that instance.
//!
//! - [`JobConfig`]: resolved interval, timeout, retry budget and priority
//! - [`JobState`]: retry state machine with drift-corrected rescheduling
//! - [`JobInfo`]: inspection snapshot

mod config;
mod runner;
mod state;

pub use config::{
    DEFAULT_INTERVAL, DEFAULT_PRIORITY, DEFAULT_RETRIES, DEFAULT_TIMEOUT, JobConfig, MIN_INTERVAL,
};
pub(crate) use runner::{Job, JobContext};
pub use runner::JobInfo;
pub use state::{
    JobError, JobState, JobStatus, Transition, next_due_after_failure, next_due_after_success,
};
