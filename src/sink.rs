//! Output Sink Layer
//!
//! Destinations for chart definitions, metric batches and operator events:
//! - **PluginSink**: renders the external plugin text protocol on a dedicated
//!   writer thread fed by a bounded MPSC channel
//! - **MemorySink**: records everything in memory
//!
//! # Components
//!
//! - [`Sink`]: capability the scheduler writes to
//! - [`PluginSinkBuilder`] / [`PluginSinkHandle`]: initialization and lifecycle management
//! - [`Event`]: operator-facing job lifecycle events

mod actor;
mod builder;
mod error;
mod facades;
mod memory;
pub mod protocol;
mod traits;
mod types;

pub use builder::{DEFAULT_CHANNEL_CAPACITY, PluginSinkBuilder, PluginSinkHandle};
pub use error::SinkError;
pub use facades::PluginSink;
pub use memory::{MemorySink, Submission};
pub use traits::{Sink, log_event};
pub use types::{Event, EventKind, EventSeverity};
