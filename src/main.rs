//! chartpoll Binary Entry Point
//!
//! Runs the configured collector jobs as an external plugin: the protocol goes
//! to stdout, logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use chartpoll::{
    ChartRegistry, PluginSinkBuilder, Scheduler,
    collector::http::HttpJsonCollector,
    collector::tcp::TcpCollector,
    config::{AppConfig, parse_duration, parse_update_every},
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// chartpoll - scheduled metric polling plugin
#[derive(Parser, Debug)]
#[command(name = "chartpoll", version, about, long_about = None)]
struct Cli {
    /// Collection interval for jobs without their own (seconds, or a duration like `500ms`)
    #[arg(value_parser = parse_update_every)]
    update_every: Option<Duration>,

    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/chartpoll.yaml",
        env = "CHARTPOLL_CONFIG"
    )]
    config: String,

    /// Directory with additional collector files (overrides config file)
    #[arg(long, env = "CHARTPOLL_COLLECTOR_PATH")]
    collector_path: Option<String>,

    /// How long to wait for in-flight cycles on shutdown
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    shutdown_timeout: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout is reserved for the plugin protocol.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chartpoll=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(path) = cli.collector_path {
        config.collector_path = Some(path);
    }
    let collector_path = config.collector_path.clone();
    if let Some(ref dir) = collector_path {
        tracing::info!("Loading collectors from: {}", dir);
    }
    config = config.merge_collector_path(collector_path.as_deref())?;
    if let Some(interval) = cli.update_every {
        config = config.with_default_interval(interval);
    }

    let handles = PluginSinkBuilder::stdout()
        .channel_capacity(config.output.channel_capacity)
        .build()?;
    let scheduler = Scheduler::new(Arc::new(ChartRegistry::new()), Arc::new(handles.sink.clone()));

    spawn_jobs(&config, &scheduler).await;
    let job_count = scheduler.job_count().await;
    if job_count == 0 {
        tracing::warn!("No enabled jobs configured");
    }

    scheduler.start()?;
    tracing::info!(jobs = job_count, "Collecting");

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = scheduler.wait_idle() => {
            tracing::warn!("No jobs left to run, disabling plugin");
            if let Err(e) = handles.sink.disable() {
                tracing::error!("Failed to emit DISABLE: {}", e);
            }
        }
    }

    tracing::info!("Shutting down scheduler...");
    if let Err(e) = scheduler.shutdown_with_timeout(cli.shutdown_timeout).await {
        tracing::error!("Failed to shutdown scheduler: {}", e);
    }

    let dropped = handles.sink.dropped();
    if dropped > 0 {
        tracing::warn!(dropped, "Submissions dropped on a full output channel");
    }
    tracing::info!("Flushing output...");
    handles.shutdown()?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Register every enabled job; a job that cannot be built is skipped.
async fn spawn_jobs(config: &AppConfig, scheduler: &Scheduler) {
    for tcp in &config.collectors.tcp {
        if !tcp.enabled {
            tracing::debug!("Skipping disabled collector: {} (tcp)", tcp.name);
            continue;
        }
        let job = config.job_config(&tcp.name, &tcp.job);
        if let Err(e) = scheduler.spawn(TcpCollector::new(tcp.clone()), job).await {
            tracing::error!("Failed to spawn collector '{}': {}", tcp.name, e);
        }
    }

    for http in &config.collectors.http {
        if !http.enabled {
            tracing::debug!("Skipping disabled collector: {} (http)", http.name);
            continue;
        }
        let job = config.job_config(&http.name, &http.job);
        let spawned = match HttpJsonCollector::new(http.clone()) {
            Ok(collector) => scheduler.spawn(collector, job).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = spawned {
            tracing::error!("Failed to spawn collector '{}': {}", http.name, e);
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
