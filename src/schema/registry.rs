//! Append-only chart schema registry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::schema::{ChartDefinition, ChartMetadata, DimensionDefinition};

/// Errors raised by the schema registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Dimension registration targeted a chart that was never registered.
    #[error("unknown chart: {0}")]
    UnknownChart(String),
}

#[derive(Debug, Default)]
struct Inner {
    charts: Vec<ChartDefinition>,
    index: HashMap<String, usize>,
}

/// Shared registry of every chart and dimension seen by the process.
///
/// Registration is append-only: charts and dimensions are never removed, even
/// when a collector stops reporting a metric. All operations are serialized by
/// a single mutex and never suspend.
#[derive(Debug, Default)]
pub struct ChartRegistry {
    inner: Mutex<Inner>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The registry holds plain data; a panic mid-append cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the chart registered under `id`, creating it if needed.
    ///
    /// Metadata, priority and interval of an existing chart are left untouched.
    pub fn ensure_chart(
        &self,
        id: &str,
        metadata: &ChartMetadata,
        priority: i64,
        update_every: u64,
    ) -> ChartDefinition {
        let mut inner = self.lock();
        if let Some(&pos) = inner.index.get(id) {
            return inner.charts[pos].clone();
        }

        let chart = ChartDefinition {
            id: id.to_owned(),
            metadata: metadata.clone(),
            priority,
            update_every,
            dimensions: Vec::new(),
        };
        let pos = inner.charts.len();
        inner.charts.push(chart.clone());
        inner.index.insert(id.to_owned(), pos);
        tracing::debug!(chart = %id, "Chart registered");
        chart
    }

    /// Append `dimension` to `chart_id` unless a dimension with the same metric
    /// name already exists.
    ///
    /// Returns `true` when the dimension was added.
    pub fn ensure_dimension(
        &self,
        chart_id: &str,
        dimension: DimensionDefinition,
    ) -> Result<bool, SchemaError> {
        let mut inner = self.lock();
        let pos = *inner
            .index
            .get(chart_id)
            .ok_or_else(|| SchemaError::UnknownChart(chart_id.to_owned()))?;

        let chart = &mut inner.charts[pos];
        if chart.has_dimension(&dimension.id) {
            return Ok(false);
        }
        tracing::debug!(chart = %chart_id, dimension = %dimension.id, "Dimension registered");
        chart.dimensions.push(dimension);
        Ok(true)
    }

    /// Snapshot of one chart.
    pub fn chart(&self, id: &str) -> Option<ChartDefinition> {
        let inner = self.lock();
        inner.index.get(id).map(|&pos| inner.charts[pos].clone())
    }

    /// Snapshot of all charts in registration order.
    pub fn charts(&self) -> Vec<ChartDefinition> {
        self.lock().charts.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
