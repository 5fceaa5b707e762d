//! Scheduler
//!
//! Dispatches job cycles from a due-time queue owned by a single tick-loop
//! task. Every due job runs in its own task; a slow or failing job never
//! delays another.
//!
//! - [`Scheduler`]: job registration, lifecycle and inspection
//! - [`DueQueue`]: ordering of pending jobs by (due, priority, registration)

mod engine;
mod queue;

pub use engine::{DEFAULT_SHUTDOWN_TIMEOUT, Scheduler, SchedulerError};
pub use queue::DueQueue;
