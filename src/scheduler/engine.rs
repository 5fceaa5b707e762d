//! Scheduler engine: job registration, tick loop and lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::collector::Collector;
use crate::job::{Job, JobConfig, JobContext, JobInfo, JobStatus};
use crate::scheduler::DueQueue;
use crate::schema::ChartRegistry;
use crate::sink::{Event, EventKind, EventSeverity, Sink};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// Static event source tag for scheduler events.
const SCHEDULER_EVENT_SOURCE: &str = "scheduler";

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job with this id is already registered.
    #[error("duplicate job id: '{0}'")]
    DuplicateJob(String),

    /// `start` was called twice.
    #[error("scheduler already started")]
    AlreadyStarted,

    /// The scheduler is shutting down.
    #[error("scheduler is shut down")]
    Shutdown,

    /// The tick loop is gone.
    #[error("scheduler channel closed")]
    ChannelClosed,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

type JobTable = Arc<RwLock<HashMap<String, JobInfo>>>;

/// Runs every registered job on its own schedule.
///
/// Jobs can be spawned before or after [`start`](Self::start); they are
/// checked as soon as the tick loop sees them.
pub struct Scheduler {
    ctx: JobContext,
    jobs: JobTable,
    next_seq: AtomicU64,
    control_tx: mpsc::UnboundedSender<Job>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    shutdown_tx: watch::Sender<bool>,
    /// Number of registered jobs that are not disabled.
    active: Arc<watch::Sender<usize>>,
    tick_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler writing into `registry` and `sink`.
    pub fn new(registry: Arc<ChartRegistry>, sink: Arc<dyn Sink>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let (active, _) = watch::channel(0);
        Self {
            ctx: JobContext { registry, sink },
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            shutdown_tx,
            active: Arc::new(active),
            tick_loop: Mutex::new(None),
        }
    }

    /// Shared chart registry.
    pub fn registry(&self) -> &Arc<ChartRegistry> {
        &self.ctx.registry
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field(
                "job_count",
                &self.jobs.try_read().map(|j| j.len()).unwrap_or(0),
            )
            .field("active", &*self.active.borrow())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Register a job running `collector` with `config`.
    ///
    /// Returns the job id (the configured name).
    pub async fn spawn<C: Collector>(
        &self,
        collector: C,
        config: JobConfig,
    ) -> Result<String, SchedulerError> {
        self.spawn_shared(Arc::new(collector), config).await
    }

    /// Register a job running an already shared collector.
    pub async fn spawn_shared(
        &self,
        collector: Arc<dyn Collector>,
        config: JobConfig,
    ) -> Result<String, SchedulerError> {
        if *self.shutdown_tx.borrow() {
            return Err(SchedulerError::Shutdown);
        }

        let id = config.name.clone();
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(SchedulerError::DuplicateJob(id));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(collector, config, seq, self.ctx.clone(), Instant::now());
        let info = job.info();
        self.control_tx
            .send(job)
            .map_err(|_| SchedulerError::ChannelClosed)?;
        jobs.insert(id.clone(), info.clone());
        drop(jobs);
        self.active.send_modify(|n| *n += 1);

        self.emit_info(
            format!("Job '{}' created", id),
            serde_json::json!({
                "job": id,
                "module": info.module,
                "interval": humantime::format_duration(info.interval).to_string(),
                "priority": info.priority,
            }),
        );
        tracing::info!(job = %id, module = %info.module, "Job registered");
        Ok(id)
    }

    /// Start the tick loop.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let control_rx = self
            .control_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(SchedulerError::AlreadyStarted)?;

        let tick_loop = TickLoop {
            control_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
            jobs: Arc::clone(&self.jobs),
            active: Arc::clone(&self.active),
            sink: Arc::clone(&self.ctx.sink),
            queue: DueQueue::new(),
            inflight: JoinSet::new(),
            running: HashMap::new(),
        };
        let handle = tokio::spawn(tick_loop.run());
        *self.tick_loop.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        self.emit_info("Scheduler started", serde_json::json!({}));
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// List all registered jobs, ordered by priority then id.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Snapshot of one job.
    pub async fn job(&self, id: &str) -> Option<JobInfo> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Resolve once every registered job is disabled.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|active| *active == 0).await;
    }

    /// Gracefully shutdown the scheduler with default timeout.
    pub async fn shutdown(self) -> Result<(), SchedulerError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop the tick loop and abort in-flight cycles, waiting up to `timeout`.
    pub async fn shutdown_with_timeout(self, timeout: Duration) -> Result<(), SchedulerError> {
        self.shutdown_tx.send_replace(true);
        let job_count = self.jobs.read().await.len();
        let handle = self
            .tick_loop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let mut timed_out = false;
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let err = SchedulerError::Internal(format!("tick loop failed: {e}"));
                    self.emit(
                        EventSeverity::Error,
                        "Scheduler shutdown failed",
                        serde_json::json!({ "job_count": job_count, "error": err.to_string() }),
                    );
                    return Err(err);
                }
                Err(_) => {
                    abort.abort();
                    timed_out = true;
                }
            }
        }

        let (severity, msg) = if timed_out {
            tracing::warn!("Scheduler shutdown timed out");
            (EventSeverity::Warn, "Scheduler shutdown timed out")
        } else {
            tracing::info!("Scheduler shutdown complete");
            (EventSeverity::Info, "Scheduler shutdown complete")
        };

        self.emit(
            severity,
            msg,
            serde_json::json!({ "job_count": job_count, "timed_out": timed_out }),
        );
        Ok(())
    }

    fn emit(
        &self,
        severity: EventSeverity,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        let event = Event::new(SCHEDULER_EVENT_SOURCE, EventKind::System, severity, message)
            .with_payload(payload);
        self.ctx.sink.emit(event);
    }

    fn emit_info(&self, message: impl Into<String>, payload: serde_json::Value) {
        self.emit(EventSeverity::Info, message, payload);
    }
}

/// State owned by the tick-loop task.
struct TickLoop {
    control_rx: mpsc::UnboundedReceiver<Job>,
    shutdown_rx: watch::Receiver<bool>,
    jobs: JobTable,
    active: Arc<watch::Sender<usize>>,
    sink: Arc<dyn Sink>,
    queue: DueQueue<Job>,
    inflight: JoinSet<Job>,
    /// In-flight task id to job id.
    running: HashMap<tokio::task::Id, String>,
}

impl TickLoop {
    async fn run(mut self) {
        loop {
            let next_due = self.queue.next_due();
            tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                Some(job) = self.control_rx.recv() => {
                    tracing::debug!(job = %job.id(), "Job queued");
                    self.enqueue(job);
                }
                Some(done) = self.inflight.join_next_with_id(), if !self.inflight.is_empty() => {
                    self.complete(done).await;
                }
                _ = sleep_until(next_due), if next_due.is_some() => {
                    self.dispatch().await;
                }
                else => break,
            }
        }

        let aborted = self.inflight.len();
        self.inflight.abort_all();
        while self.inflight.join_next().await.is_some() {}
        tracing::debug!(aborted, "Tick loop stopped");
    }

    fn enqueue(&mut self, job: Job) {
        self.queue
            .push(job.next_due(), job.priority(), job.seq(), job);
    }

    /// Start a cycle for every job that is due, lowest priority value first.
    async fn dispatch(&mut self) {
        let due = self.queue.pop_due(Instant::now());
        if due.is_empty() {
            return;
        }

        let mut jobs = self.jobs.write().await;
        for mut job in due {
            job.mark_running();
            let id = job.id().to_owned();
            jobs.insert(id.clone(), job.info());
            let handle = self.inflight.spawn(job.run_cycle());
            self.running.insert(handle.id(), id);
        }
    }

    /// Record a finished cycle and requeue the job unless it is disabled.
    async fn complete(&mut self, done: Result<(tokio::task::Id, Job), JoinError>) {
        match done {
            Ok((task_id, job)) => {
                self.running.remove(&task_id);
                let info = job.info();
                let disabled = job.is_disabled();
                self.jobs.write().await.insert(info.id.clone(), info);
                if disabled {
                    self.active.send_modify(|n| *n = n.saturating_sub(1));
                } else {
                    self.enqueue(job);
                }
            }
            Err(e) => {
                // The job value is lost with its task; it cannot run again.
                let id = self.running.remove(&e.id());
                tracing::error!(job = ?id, error = %e, "Job cycle task failed");
                if let Some(id) = id {
                    if let Some(info) = self.jobs.write().await.get_mut(&id) {
                        info.status = JobStatus::Disabled;
                        info.last_failure = Some(e.to_string());
                    }
                    let event = Event::new(
                        format!("job.{id}"),
                        EventKind::Error,
                        EventSeverity::Critical,
                        format!("Job '{id}' lost its cycle task and is disabled"),
                    )
                    .with_payload(serde_json::json!({ "job": id, "reason": e.to_string() }));
                    self.sink.emit(event);
                }
                self.active.send_modify(|n| *n = n.saturating_sub(1));
            }
        }
    }
}

async fn sleep_until(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorError, MetricSample};
    use crate::sink::MemorySink;

    struct Counter;

    #[async_trait::async_trait]
    impl Collector for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn collect(&self, _deadline: Instant) -> Result<MetricSample, CollectorError> {
            Ok(MetricSample::new().with("value", 1_i64))
        }
    }

    fn scheduler() -> (Scheduler, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let scheduler = Scheduler::new(Arc::new(ChartRegistry::new()), sink.clone());
        (scheduler, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_lifecycle() {
        let (scheduler, sink) = scheduler();

        let id = scheduler
            .spawn(Counter, JobConfig::new("counter_local"))
            .await
            .unwrap();
        assert_eq!(id, "counter_local");
        assert_eq!(scheduler.job_count().await, 1);
        assert_eq!(
            scheduler.job("counter_local").await.unwrap().status,
            JobStatus::Unchecked
        );

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let info = scheduler.job("counter_local").await.unwrap();
        assert_eq!(info.module, "counter");
        assert_eq!(info.charts, 1);
        assert!(info.last_success.is_some());
        assert_eq!(sink.submissions_for("counter_local").len(), 3);

        scheduler.shutdown().await.unwrap();
        let messages: Vec<_> = sink.events().into_iter().map(|e| e.message).collect();
        assert!(messages.contains(&"Scheduler started".to_string()));
        assert!(messages.contains(&"Scheduler shutdown complete".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_job_rejected() {
        let (scheduler, _) = scheduler();
        scheduler
            .spawn(Counter, JobConfig::new("dup"))
            .await
            .unwrap();
        let err = scheduler
            .spawn(Counter, JobConfig::new("dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateJob(id) if id == "dup"));
        assert_eq!(scheduler.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (scheduler, _) = scheduler();
        scheduler.start().unwrap();
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::AlreadyStarted)
        ));
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let (scheduler, _) = scheduler();
        assert!(scheduler.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_list_jobs_ordered_by_priority() {
        let (scheduler, _) = scheduler();
        scheduler
            .spawn(Counter, JobConfig::new("b").with_priority(5))
            .await
            .unwrap();
        scheduler
            .spawn(Counter, JobConfig::new("a").with_priority(9))
            .await
            .unwrap();
        let ids: Vec<_> = scheduler
            .list_jobs()
            .await
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
