//! Collector Layer
//!
//! Pluggable collectors that fetch one data source and normalize its readings
//! into a flat [`MetricSample`]. The scheduler runs each collector in its own
//! Tokio task under the job's deadline.
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait for implementing data collectors
//! - [`MetricSample`]: metric name to value mapping of one cycle
//! - [`tcp::TcpCollector`]: TCP connect probe
//! - [`http::HttpJsonCollector`]: numeric leaves of a JSON endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use chartpoll::collector::tcp::{TcpCollector, TcpConfig};
//! use std::time::Duration;
//!
//! let config = TcpConfig::new("redis-probe", "127.0.0.1", 6379)
//!     .with_interval(Duration::from_secs(30));
//! let collector = TcpCollector::new(config);
//! // scheduler.spawn(collector, job_config);
//! ```

pub mod http;
mod sample;
pub mod tcp;
mod traits;

pub use sample::{MetricSample, MetricValue};
pub use traits::{Collector, CollectorError, FALLBACK_CHART};
