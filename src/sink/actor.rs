//! Writer actor with dedicated output stream and MPSC channel.
//!
//! Single-writer pattern: one thread owns the output, renders commands into the
//! plugin protocol and flushes after every complete block so the agent never
//! sees a partial BEGIN/END.

use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};

use crate::collector::MetricSample;
use crate::schema::ChartDefinition;
use crate::sink::SinkError;
use crate::sink::protocol::{write_chart, write_disable, write_values};

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// (Re)define a chart.
    Define(ChartDefinition),
    /// Render one chart's values.
    Submit {
        chart_id: String,
        sample: MetricSample,
        ts: DateTime<Utc>,
    },
    /// Tell the agent there is nothing left to collect.
    Disable,
    /// Graceful shutdown.
    Shutdown,
}

/// Output writer actor.
pub struct WriterActor {
    out: BufWriter<Box<dyn Write + Send>>,
    rx: Receiver<Command>,
    last_submit: HashMap<String, DateTime<Utc>>,
}

impl WriterActor {
    /// Spawn the writer actor thread.
    pub fn spawn(
        out: Box<dyn Write + Send>,
        channel_capacity: usize,
    ) -> Result<(JoinHandle<()>, SyncSender<Command>), SinkError> {
        let (tx, rx) = mpsc::sync_channel(channel_capacity);
        let mut actor = WriterActor {
            out: BufWriter::new(out),
            rx,
            last_submit: HashMap::new(),
        };
        let handle = thread::Builder::new()
            .name("chartpoll-writer".to_string())
            .spawn(move || actor.run())
            .map_err(SinkError::Io)?;
        Ok((handle, tx))
    }

    fn run(&mut self) {
        tracing::debug!("WriterActor started");

        while let Ok(cmd) = self.rx.recv() {
            match self.handle_command(cmd) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    // Output closed: the agent is gone, nothing more can be delivered.
                    tracing::error!(error = %e, "Plugin output failed, stopping writer");
                    return;
                }
            }
        }

        if let Err(e) = self.out.flush() {
            tracing::warn!(error = %e, "Final flush failed");
        }
        tracing::debug!("WriterActor stopped");
    }

    fn handle_command(&mut self, cmd: Command) -> Result<bool, SinkError> {
        match cmd {
            Command::Define(chart) => {
                write_chart(&mut self.out, &chart)?;
                self.out.flush()?;
            }
            Command::Submit {
                chart_id,
                sample,
                ts,
            } => {
                let since_last_us = self
                    .last_submit
                    .insert(chart_id.clone(), ts)
                    .and_then(|prev| (ts - prev).num_microseconds())
                    .and_then(|us| u64::try_from(us).ok());
                write_values(&mut self.out, &chart_id, &sample, since_last_us)?;
                self.out.flush()?;
            }
            Command::Disable => {
                write_disable(&mut self.out)?;
                self.out.flush()?;
            }
            Command::Shutdown => {
                tracing::debug!("WriterActor shutting down");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Write handle into a shared buffer.
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
    fn test_actor_renders_since_last() {
        let buf = Shared::default();
        let (handle, tx) = WriterActor::spawn(Box::new(buf.clone()), 16).unwrap();

        let t0 = Utc::now();
        let sample = MetricSample::new().with("x", 1_i64);
        tx.send(Command::Submit {
            chart_id: "j.c".into(),
            sample: sample.clone(),
            ts: t0,
        })
        .unwrap();
        tx.send(Command::Submit {
            chart_id: "j.c".into(),
            sample,
            ts: t0 + chrono::Duration::milliseconds(1500),
        })
        .unwrap();
        tx.send(Command::Disable).unwrap();
        tx.send(Command::Shutdown).unwrap();
        handle.join().unwrap();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            out,
            "BEGIN j.c\nSET x = 1\nEND\nBEGIN j.c 1500000\nSET x = 1\nEND\nDISABLE\n"
        );
    }
}
