//! Jobs rendered through the plugin protocol sink.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chartpoll::{
    ChartMetadata, ChartRegistry, ChartTemplate, Collector, CollectorError, DimensionDefinition,
    JobConfig, MetricSample, Placement, PluginSinkBuilder, Scheduler,
};
use tokio::time::Instant;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Two collections, the second one discovering a new dimension.
struct WebStats {
    round: Mutex<u32>,
}

#[async_trait::async_trait]
impl Collector for WebStats {
    fn name(&self) -> &str {
        "web"
    }

    fn charts(&self) -> Vec<ChartTemplate> {
        vec![
            ChartTemplate::new(
                "requests",
                ChartMetadata::new("Requests", "requests/s")
                    .with_family("http")
                    .with_context("web.requests"),
            )
            .with_dimension(DimensionDefinition::incremental("requests")),
        ]
    }

    fn place(&self, metric: &str) -> Option<Placement> {
        metric.starts_with("status_").then(|| {
            Placement::new(
                "statuses",
                DimensionDefinition::incremental(metric).with_name(&metric["status_".len()..]),
            )
        })
    }

    async fn collect(&self, _deadline: Instant) -> Result<MetricSample, CollectorError> {
        let mut round = self.round.lock().unwrap();
        *round += 1;
        match *round {
            1 => Ok(MetricSample::new()
                .with("requests", 100_i64)
                .with("status_200", 90_i64)),
            2 => Ok(MetricSample::new()
                .with("requests", 150_i64)
                .with("status_200", 130_i64)
                .with("status_500", 20.6)),
            _ => Err(CollectorError::NoData("done".into())),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_protocol_stream() {
    let buf = SharedBuf::default();
    let handles = PluginSinkBuilder::new(buf.clone())
        .channel_capacity(64)
        .build()
        .unwrap();
    let scheduler = Scheduler::new(
        Arc::new(ChartRegistry::new()),
        Arc::new(handles.sink.clone()),
    );
    scheduler
        .spawn(
            WebStats {
                round: Mutex::new(0),
            },
            JobConfig::new("web_local").with_priority(100).with_retries(1),
        )
        .await
        .unwrap();
    scheduler.start().unwrap();
    tokio::time::timeout(Duration::from_secs(60), scheduler.wait_idle())
        .await
        .unwrap();
    scheduler.shutdown().await.unwrap();
    handles.sink.disable().unwrap();
    assert_eq!(handles.sink.dropped(), 0);
    handles.shutdown().unwrap();

    let lines = buf.lines();
    let expected_head = [
        "CHART web_local.requests '' 'Requests' 'requests/s' 'http' 'web.requests' line 100 1",
        "DIMENSION requests 'requests' incremental 1 1",
        "CHART web_local.statuses '' 'statuses' 'value' '' 'web.statuses' line 101 1",
        "DIMENSION status_200 '200' incremental 1 1",
        "BEGIN web_local.requests",
        "SET requests = 100",
        "END",
        "BEGIN web_local.statuses",
        "SET status_200 = 90",
        "END",
        // Redefined once it gains a dimension.
        "CHART web_local.statuses '' 'statuses' 'value' '' 'web.statuses' line 101 1",
        "DIMENSION status_200 '200' incremental 1 1",
        "DIMENSION status_500 '500' incremental 1 1",
    ];
    assert_eq!(&lines[..expected_head.len()], &expected_head[..]);

    let tail = &lines[expected_head.len()..];
    assert!(tail[0].starts_with("BEGIN web_local.requests "));
    assert_eq!(tail[1], "SET requests = 150");
    assert_eq!(tail[2], "END");
    assert!(tail[3].starts_with("BEGIN web_local.statuses "));
    assert_eq!(tail[4], "SET status_200 = 130");
    assert_eq!(tail[5], "SET status_500 = 21");
    assert_eq!(tail[6], "END");
    assert_eq!(tail[7], "DISABLE");
    assert_eq!(tail.len(), 8);
}
