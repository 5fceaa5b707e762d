//! Chart and dimension definitions.
//!
//! A chart groups related dimensions that are rendered together. Collectors
//! declare chart templates; the registry turns them into [`ChartDefinition`]s
//! keyed by `<job id>.<chart name>`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How the sink interprets successive values of a dimension.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Algorithm {
    /// Value is rendered as collected.
    #[default]
    Absolute,
    /// Sink computes the delta from the previous value divided by elapsed time.
    Incremental,
}

/// Rendering hint for a chart.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChartType {
    #[default]
    Line,
    Area,
    Stacked,
}

/// One numeric series within a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDefinition {
    /// Metric name as it appears in a sample.
    pub id: String,
    /// Display name (defaults to the metric name).
    pub name: String,
    /// Aggregation kind.
    pub algorithm: Algorithm,
    /// Applied by the sink at render time.
    pub multiplier: i64,
    /// Applied by the sink at render time.
    pub divisor: i64,
}

impl DimensionDefinition {
    /// Create an absolute dimension with unit scaling.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            algorithm: Algorithm::Absolute,
            multiplier: 1,
            divisor: 1,
        }
    }

    /// Create an incremental dimension with unit scaling.
    pub fn incremental(id: impl Into<String>) -> Self {
        Self::new(id).with_algorithm(Algorithm::Incremental)
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the aggregation kind.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set multiplier and divisor.
    pub fn with_scale(mut self, multiplier: i64, divisor: i64) -> Self {
        self.multiplier = multiplier;
        self.divisor = divisor;
        self
    }
}

/// Display metadata of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub title: String,
    pub units: String,
    /// Submenu the chart is grouped under.
    pub family: String,
    /// Context shared by charts of the same kind across jobs (e.g. `tcp.latency`).
    pub context: String,
    pub chart_type: ChartType,
}

impl ChartMetadata {
    /// Metadata with the given title and units, empty family/context, line chart.
    pub fn new(title: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            units: units.into(),
            family: String::new(),
            context: String::new(),
            chart_type: ChartType::Line,
        }
    }

    /// Metadata for a chart nobody declared up front.
    pub fn untitled(chart: &str) -> Self {
        Self::new(chart, "value")
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_chart_type(mut self, chart_type: ChartType) -> Self {
        self.chart_type = chart_type;
        self
    }
}

/// Static chart declaration supplied by a collector.
///
/// Collectors build these fresh for every instance, so two jobs of the same
/// module never share mutable chart state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartTemplate {
    /// Chart name, unique within one collector instance.
    pub name: String,
    pub metadata: ChartMetadata,
    /// Dimensions known before the first collection.
    pub dimensions: Vec<DimensionDefinition>,
}

impl ChartTemplate {
    pub fn new(name: impl Into<String>, metadata: ChartMetadata) -> Self {
        Self {
            name: name.into(),
            metadata,
            dimensions: Vec::new(),
        }
    }

    /// Append a dimension declaration.
    pub fn with_dimension(mut self, dimension: DimensionDefinition) -> Self {
        self.dimensions.push(dimension);
        self
    }
}

/// Where a previously unseen metric goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Chart name within the collector instance.
    pub chart: String,
    pub dimension: DimensionDefinition,
}

impl Placement {
    pub fn new(chart: impl Into<String>, dimension: DimensionDefinition) -> Self {
        Self {
            chart: chart.into(),
            dimension,
        }
    }
}

/// A registered chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartDefinition {
    /// Full id: `<job id>.<chart name>`.
    pub id: String,
    pub metadata: ChartMetadata,
    /// Display priority; lower renders first.
    pub priority: i64,
    /// Collection interval in seconds.
    pub update_every: u64,
    /// Dimensions in first-seen order.
    pub dimensions: Vec<DimensionDefinition>,
}

impl ChartDefinition {
    /// Job part of the id (`type` in the plugin protocol).
    pub fn type_id(&self) -> &str {
        self.id.split_once('.').map_or(self.id.as_str(), |(t, _)| t)
    }

    /// Chart part of the id.
    pub fn name(&self) -> &str {
        self.id.split_once('.').map_or("", |(_, n)| n)
    }

    /// Look up a dimension by metric name.
    pub fn dimension(&self, id: &str) -> Option<&DimensionDefinition> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    pub fn has_dimension(&self, id: &str) -> bool {
        self.dimension(id).is_some()
    }
}
