//! Job: one collector instance, its schedule and its chart state.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::collector::{Collector, CollectorError, FALLBACK_CHART, MetricSample};
use crate::job::{JobConfig, JobError, JobState, JobStatus, Transition};
use crate::schema::{ChartMetadata, ChartRegistry, DimensionDefinition, Placement, SchemaError};
use crate::sink::{Event, EventKind, EventSeverity, Sink};

/// Snapshot of a job for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    /// Job id.
    pub id: String,
    /// Collector module name.
    pub module: String,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub priority: i64,
    pub status: JobStatus,
    pub failure_streak: u32,
    pub retries_remaining: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<String>,
    /// Charts owned by the job.
    pub charts: usize,
}

/// Shared collaborators of every job.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub registry: Arc<ChartRegistry>,
    pub sink: Arc<dyn Sink>,
}

/// Charts owned by one job and the routing of metric names into them.
#[derive(Debug, Default)]
struct JobCharts {
    /// Full chart ids in creation order.
    order: Vec<String>,
    /// Metric name to the full ids of the charts that carry it.
    routes: HashMap<String, Vec<String>>,
    /// Chart for metrics the collector does not place itself.
    default_chart: Option<String>,
}

/// Scheduling unit.
///
/// A job is moved into the task that runs its cycle and handed back when the
/// cycle completes, so two cycles of one job can never overlap.
pub(crate) struct Job {
    config: JobConfig,
    module: String,
    seq: u64,
    collector: Arc<dyn Collector>,
    state: JobState,
    charts: JobCharts,
    ctx: JobContext,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.config.name)
            .field("module", &self.module)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Job {
    pub(crate) fn new(
        collector: Arc<dyn Collector>,
        config: JobConfig,
        seq: u64,
        ctx: JobContext,
        now: Instant,
    ) -> Self {
        let config = config.clamped();
        let module = collector.name().to_owned();
        let state = JobState::new(config.retries, now);
        Self {
            config,
            module,
            seq,
            collector,
            state,
            charts: JobCharts::default(),
            ctx,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn priority(&self) -> i64 {
        self.config.priority
    }

    pub(crate) fn next_due(&self) -> Instant {
        self.state.next_due()
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.state.is_disabled()
    }

    pub(crate) fn mark_running(&mut self) {
        if self.state.status() == JobStatus::Pending {
            self.state.begin();
        }
    }

    pub(crate) fn info(&self) -> JobInfo {
        JobInfo {
            id: self.config.name.clone(),
            module: self.module.clone(),
            interval: self.config.interval,
            priority: self.config.priority,
            status: self.state.status(),
            failure_streak: self.state.failure_streak(),
            retries_remaining: self.state.retries_remaining(),
            last_success: self.state.last_success(),
            last_failure: self.state.last_failure().map(ToString::to_string),
            charts: self.charts.order.len(),
        }
    }

    /// Run the next step of the job: the one-time check, or a collection.
    pub(crate) async fn run_cycle(mut self) -> Self {
        match self.state.status() {
            JobStatus::Unchecked => self.run_check().await,
            JobStatus::Disabled => {}
            JobStatus::Pending | JobStatus::Running => self.run_collect().await,
        }
        self
    }

    async fn run_check(&mut self) {
        let timeout = self.config.timeout;
        let deadline = Instant::now() + timeout;
        let collector = Arc::clone(&self.collector);
        let outcome = guarded(tokio::spawn(async move { collector.check().await }), deadline, timeout)
            .await
            .and_then(|ok| {
                if ok {
                    Ok(())
                } else {
                    Err(JobError::Configuration("check failed".to_string()))
                }
            })
            .and_then(|()| match contained(|| self.create_charts()) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(JobError::Configuration(e.to_string())),
                Err(msg) => Err(JobError::Configuration(format!("collector panicked: {msg}"))),
            });

        match outcome {
            Ok(()) => {
                let now = Instant::now();
                let first_due = if self.config.align_to_interval {
                    aligned_due(self.config.interval, now)
                } else {
                    now
                };
                self.state.checked(first_due);
                tracing::info!(
                    job = %self.config.name,
                    module = %self.module,
                    interval = ?self.config.interval,
                    charts = self.charts.order.len(),
                    "Job check passed"
                );
            }
            Err(err) => {
                let reason = match err {
                    JobError::Configuration(reason) => reason,
                    other => format!("check failed: {other}"),
                };
                let fatal = self.state.check_failed(reason);
                self.report_fatal(&fatal);
            }
        }
    }

    async fn run_collect(&mut self) {
        self.mark_running();
        let timeout = self.config.timeout;
        let started = Instant::now();
        let deadline = started + timeout;
        let collector = Arc::clone(&self.collector);

        let result = guarded(
            tokio::spawn(async move { collector.collect(deadline).await }),
            deadline,
            timeout,
        )
        .await
        .and_then(|r| {
            r.map_err(|e| match e {
                CollectorError::Timeout => JobError::Timeout(timeout),
                other => JobError::Transient(other.to_string()),
            })
        })
        .and_then(|sample| {
            if sample.is_empty() {
                Err(JobError::Transient("collector returned no data".to_string()))
            } else {
                Ok(sample)
            }
        });

        let result = result.and_then(|sample| match contained(|| self.publish(&sample)) {
            Ok(published) => published.map_err(|e| JobError::Transient(e.to_string())),
            Err(msg) => Err(JobError::Transient(format!("collector panicked: {msg}"))),
        });

        let now = Instant::now();
        match result {
            Ok(()) => {
                let skipped = self.state.succeed(self.config.interval, now);
                tracing::trace!(job = %self.config.name, elapsed = ?(now - started), "Collection succeeded");
                if skipped > 0 {
                    tracing::debug!(job = %self.config.name, skipped, "Cycle overran, skipped slots");
                }
            }
            Err(err) => {
                tracing::debug!(
                    job = %self.config.name,
                    error = %err,
                    streak = self.state.failure_streak() + 1,
                    "Collection failed"
                );
                if let Transition::Disabled(fatal) = self.state.fail(err, self.config.interval, now)
                {
                    self.report_fatal(&fatal);
                }
            }
        }
    }

    /// Register the collector's static charts and define them on the sink.
    fn create_charts(&mut self) -> Result<(), SchemaError> {
        let templates = self.collector.charts();
        self.charts.default_chart = templates.first().map(|t| t.name.clone());

        for template in templates {
            let chart_id = self.ensure_chart(&template.name, &template.metadata);
            for dimension in template.dimensions {
                self.ensure_dimension(&chart_id, dimension)?;
            }
        }
        for chart_id in &self.charts.order {
            if let Some(chart) = self.ctx.registry.chart(chart_id) {
                self.ctx.sink.define(&chart);
            }
        }
        Ok(())
    }

    /// Register unseen metrics, then forward the sample chart by chart.
    fn publish(&mut self, sample: &MetricSample) -> Result<(), SchemaError> {
        let mut changed: Vec<String> = Vec::new();

        for name in sample.names() {
            if self.charts.routes.contains_key(name) {
                continue;
            }
            let placement = self
                .collector
                .place(name)
                .unwrap_or_else(|| self.default_placement(name));

            let metadata = ChartMetadata::untitled(&placement.chart)
                .with_context(format!("{}.{}", self.module, placement.chart));
            let known = self.charts.order.len();
            let chart_id = self.ensure_chart(&placement.chart, &metadata);
            let created = self.charts.order.len() > known;
            let added = self.ensure_dimension(&chart_id, placement.dimension)?;
            if (created || added) && !changed.contains(&chart_id) {
                changed.push(chart_id);
            }
        }

        for chart_id in &changed {
            if let Some(chart) = self.ctx.registry.chart(chart_id) {
                self.ctx.sink.define(&chart);
            }
        }

        let mut slices: HashMap<&str, MetricSample> = HashMap::new();
        for (name, value) in sample.iter() {
            for chart_id in self.charts.routes.get(name).into_iter().flatten() {
                slices
                    .entry(chart_id.as_str())
                    .or_default()
                    .insert(name, value);
            }
        }

        let ts = Utc::now();
        for chart_id in &self.charts.order {
            if let Some(slice) = slices.get(chart_id.as_str()) {
                self.ctx
                    .sink
                    .submit(&self.config.name, chart_id, slice, ts);
            }
        }
        Ok(())
    }

    fn default_placement(&self, metric: &str) -> Placement {
        let chart = self
            .charts
            .default_chart
            .clone()
            .unwrap_or_else(|| FALLBACK_CHART.to_string());
        Placement::new(chart, DimensionDefinition::new(metric))
    }

    /// Full chart id for a chart name, registering the chart on first use.
    fn ensure_chart(&mut self, name: &str, metadata: &ChartMetadata) -> String {
        let chart_id = format!("{}.{}", self.config.name, name);
        if !self.charts.order.contains(&chart_id) {
            let offset = i64::try_from(self.charts.order.len()).unwrap_or(i64::MAX);
            let priority = self.config.priority.saturating_add(offset);
            self.ctx
                .registry
                .ensure_chart(&chart_id, metadata, priority, self.config.update_every());
            self.charts.order.push(chart_id.clone());
        }
        chart_id
    }

    fn ensure_dimension(
        &mut self,
        chart_id: &str,
        dimension: DimensionDefinition,
    ) -> Result<bool, SchemaError> {
        let routes = self.charts.routes.entry(dimension.id.clone()).or_default();
        if !routes.iter().any(|c| c == chart_id) {
            routes.push(chart_id.to_owned());
        }
        self.ctx.registry.ensure_dimension(chart_id, dimension)
    }

    fn report_fatal(&self, err: &JobError) {
        let (kind, severity, message) = match err {
            JobError::Configuration(_) => (
                EventKind::Configuration,
                EventSeverity::Error,
                format!("Job '{}' failed its check and is disabled", self.config.name),
            ),
            _ => (
                EventKind::Error,
                EventSeverity::Critical,
                format!("Job '{}' exhausted its retries and is disabled", self.config.name),
            ),
        };
        tracing::error!(job = %self.config.name, module = %self.module, error = %err, "Job disabled");

        let event = Event::new(format!("job.{}", self.config.name), kind, severity, message)
            .with_payload(serde_json::json!({
                "job": self.config.name,
                "module": self.module,
                "reason": err.to_string(),
                "failure_streak": self.state.failure_streak(),
            }));
        self.ctx.sink.emit(event);
    }
}

/// Handle that aborts its task when dropped, so cancelling a cycle also
/// cancels the collector call it is waiting on.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Await a collector task under a deadline, containing panics.
async fn guarded<T>(
    handle: JoinHandle<T>,
    deadline: Instant,
    timeout: Duration,
) -> Result<T, JobError> {
    match tokio::time::timeout_at(deadline, AbortOnDrop(handle)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.is_panic() => Err(JobError::Transient(format!(
            "collector panicked: {}",
            panic_message(e.into_panic())
        ))),
        Ok(Err(e)) => Err(JobError::Transient(format!("collector task failed: {e}"))),
        Err(_) => Err(JobError::Timeout(timeout)),
    }
}

/// Run synchronous job work that calls into the collector or the sink,
/// turning a panic into its message.
fn contained<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Next wall-clock multiple of `interval`, expressed on the monotonic clock.
fn aligned_due(interval: Duration, now: Instant) -> Instant {
    let period = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
    let wall = Utc::now().timestamp_millis();
    let wait = period - wall.rem_euclid(period);
    now + Duration::from_millis(wait.unsigned_abs())
}
