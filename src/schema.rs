//! Chart Schema
//!
//! Charts and dimensions that describe how collected metrics are rendered.
//!
//! - [`ChartTemplate`]: static chart declaration supplied by a collector
//! - [`ChartDefinition`]: a registered chart with its dimensions
//! - [`ChartRegistry`]: append-only registry shared by all jobs

mod registry;
mod types;

pub use registry::{ChartRegistry, SchemaError};
pub use types::{
    Algorithm, ChartDefinition, ChartMetadata, ChartTemplate, ChartType, DimensionDefinition,
    Placement,
};
