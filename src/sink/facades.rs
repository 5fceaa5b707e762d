//! User-facing plugin sink facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};

use chrono::{DateTime, Utc};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::collector::MetricSample;
use crate::schema::ChartDefinition;
use crate::sink::actor::Command;
use crate::sink::{Event, Sink, SinkError, log_event};

/// Non-blocking plugin protocol sink.
///
/// Uses `try_send` - submissions are dropped if the channel is full. Chart
/// definitions wait for room instead, so a dropped definition can never leave
/// the agent with values for an unknown dimension. That wait blocks the
/// calling thread while stdout is backpressured; on a multi-threaded runtime
/// the worker is handed off through [`tokio::task::block_in_place`] first.
#[derive(Clone)]
pub struct PluginSink {
    tx: SyncSender<Command>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for PluginSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSink")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl PluginSink {
    pub(crate) fn new(tx: SyncSender<Command>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total count of submissions dropped due to channel capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Emit `DISABLE`.
    pub fn disable(&self) -> Result<(), SinkError> {
        self.tx
            .send(Command::Disable)
            .map_err(|_| SinkError::ChannelSend)
    }

    pub(crate) fn shutdown(&self) -> Result<(), SinkError> {
        self.tx
            .send(Command::Shutdown)
            .map_err(|_| SinkError::ChannelSend)
    }
}

impl Sink for PluginSink {
    fn define(&self, chart: &ChartDefinition) {
        let sent = match self.tx.try_send(Command::Define(chart.clone())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(cmd)) => {
                tracing::debug!(chart = %chart.id, "Channel full, waiting to send chart definition");
                blocking(|| self.tx.send(cmd)).map_err(|_| ())
            }
            Err(TrySendError::Disconnected(_)) => Err(()),
        };
        if sent.is_err() {
            tracing::warn!(chart = %chart.id, "Writer stopped, dropping chart definition");
        }
    }

    fn submit(&self, job_id: &str, chart_id: &str, sample: &MetricSample, ts: DateTime<Utc>) {
        let cmd = Command::Submit {
            chart_id: chart_id.to_owned(),
            sample: sample.clone(),
            ts,
        };
        if self.tx.try_send(cmd).is_err() {
            tracing::warn!(job = %job_id, chart = %chart_id, "Channel full, dropping submission");
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn emit(&self, event: Event) {
        // stdout carries the protocol; events go to the log.
        log_event(&event);
    }
}

/// Run a blocking call without stalling other tasks on a multi-threaded
/// runtime. A current-thread runtime cannot hand off its only worker, so the
/// call just blocks there.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;
    use std::time::Duration;

    use crate::schema::{ChartMetadata, DimensionDefinition};

    fn chart() -> ChartDefinition {
        ChartDefinition {
            id: "web.values".into(),
            metadata: ChartMetadata::new("Values", "value"),
            priority: 60000,
            update_every: 1,
            dimensions: vec![DimensionDefinition::new("hits")],
        }
    }

    fn submit(sink: &PluginSink) {
        sink.submit("web", "web.values", &MetricSample::new().with("hits", 1_i64), Utc::now());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_define_waits_for_room_on_full_channel() {
        let (tx, rx) = sync_channel(1);
        let sink = PluginSink::new(tx);
        submit(&sink);
        submit(&sink);
        assert_eq!(sink.dropped(), 1);

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let first = rx.recv().unwrap();
            let second = rx.recv().unwrap();
            (first, second)
        });
        let definer = sink.clone();
        tokio::spawn(async move { definer.define(&chart()) })
            .await
            .unwrap();

        let (first, second) = writer.join().unwrap();
        assert!(matches!(first, Command::Submit { .. }));
        assert!(matches!(second, Command::Define(c) if c.id == "web.values"));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_define_after_writer_stopped_is_dropped() {
        let (tx, rx) = sync_channel(1);
        drop(rx);
        let sink = PluginSink::new(tx);
        sink.define(&chart());
        assert!(sink.disable().is_err());
    }
}
