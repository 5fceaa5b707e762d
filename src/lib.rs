//! chartpoll - scheduled metric polling for chart-based monitoring agents
//!
//! Runs many independent collector jobs, each on its own interval, and turns
//! their flat key/value readings into chart and dimension streams. Jobs are
//! checked once, retried on failure and disabled when their retry budget runs
//! out; one job never blocks another.
//!
//! # Architecture
//!
//! - **Collectors**: pluggable data sources returning a [`MetricSample`] per cycle
//! - **Schema**: chart and dimension registry shared by all jobs
//! - **Jobs**: per-instance retry state machine with drift-corrected rescheduling
//! - **Scheduler**: due-time queue dispatching concurrent job cycles
//! - **Sinks**: chart definitions and values, rendered as the external plugin
//!   protocol or kept in memory
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chartpoll::collector::tcp::{TcpCollector, TcpConfig};
//! use chartpoll::{ChartRegistry, JobConfig, PluginSinkBuilder, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handles = PluginSinkBuilder::stdout().build()?;
//!     let scheduler = Scheduler::new(Arc::new(ChartRegistry::new()), Arc::new(handles.sink.clone()));
//!
//!     let collector = TcpCollector::new(TcpConfig::new("redis_local", "127.0.0.1", 6379));
//!     let job = JobConfig::new("redis_local").with_interval(Duration::from_secs(5));
//!     scheduler.spawn(collector, job).await?;
//!     scheduler.start()?;
//!
//!     scheduler.wait_idle().await;
//!     scheduler.shutdown().await?;
//!     handles.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod job;
pub mod scheduler;
pub mod schema;
pub mod sink;

pub use collector::{Collector, CollectorError, MetricSample, MetricValue};
pub use job::{JobConfig, JobError, JobInfo, JobStatus};
pub use scheduler::{Scheduler, SchedulerError};
pub use schema::{
    Algorithm, ChartDefinition, ChartMetadata, ChartRegistry, ChartTemplate, ChartType,
    DimensionDefinition, Placement,
};
pub use sink::{
    Event, EventKind, EventSeverity, MemorySink, PluginSink, PluginSinkBuilder, PluginSinkHandle,
    Sink,
};
