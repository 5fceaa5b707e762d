//! Plugin sink builder and handle.

use std::io::Write;
use std::thread::JoinHandle;

use crate::sink::actor::WriterActor;
use crate::sink::{PluginSink, SinkError};

/// Default channel capacity for writer commands.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Builder for the plugin protocol sink.
pub struct PluginSinkBuilder {
    out: Box<dyn Write + Send>,
    channel_capacity: usize,
}

impl PluginSinkBuilder {
    /// Render into `out`.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Render to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Spawn the writer thread.
    pub fn build(self) -> Result<PluginSinkHandle, SinkError> {
        let (handle, tx) = WriterActor::spawn(self.out, self.channel_capacity)?;
        Ok(PluginSinkHandle {
            sink: PluginSink::new(tx),
            actor_handle: Some(handle),
        })
    }
}

/// Owner of the writer thread.
pub struct PluginSinkHandle {
    /// Cloneable facade handed to the scheduler.
    pub sink: PluginSink,
    actor_handle: Option<JoinHandle<()>>,
}

impl PluginSinkHandle {
    /// Flush pending output and stop the writer thread.
    pub fn shutdown(mut self) -> Result<(), SinkError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        let Some(handle) = self.actor_handle.take() else {
            return Ok(());
        };
        // Writer may have stopped on its own after an output error.
        let _ = self.sink.shutdown();
        handle
            .join()
            .map_err(|_| SinkError::Internal("Failed to join writer thread".to_string()))
    }
}

impl Drop for PluginSinkHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MetricSample;
    use crate::schema::{ChartDefinition, ChartMetadata, DimensionDefinition};
    use crate::sink::Sink;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_plugin_sink_roundtrip() {
        let buf = Shared::default();
        let handles = PluginSinkBuilder::new(buf.clone())
            .channel_capacity(8)
            .build()
            .unwrap();

        let chart = ChartDefinition {
            id: "web.values".into(),
            metadata: ChartMetadata::new("Values", "value"),
            priority: 60000,
            update_every: 1,
            dimensions: vec![DimensionDefinition::new("hits")],
        };
        handles.sink.define(&chart);
        handles.sink.submit(
            "web",
            "web.values",
            &MetricSample::new().with("hits", 7_i64),
            chrono::Utc::now(),
        );
        handles.sink.disable().unwrap();
        assert_eq!(handles.sink.dropped(), 0);
        handles.shutdown().unwrap();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "CHART web.values '' 'Values' 'value' '' '' line 60000 1",
                "DIMENSION hits 'hits' absolute 1 1",
                "BEGIN web.values",
                "SET hits = 7",
                "END",
                "DISABLE",
            ]
        );
    }
}
