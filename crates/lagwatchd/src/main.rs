//! lagwatchd — the lagwatch daemon.
//!
//! Single binary that assembles the exporter:
//! - Kafka client (connected and pinged before anything else starts)
//! - Metric catalog
//! - Scrape endpoint (`GET /metrics`)
//! - Collection scheduler
//!
//! # Usage
//!
//! ```text
//! lagwatchd --kafka.servers kafka-1:9092,kafka-2:9092 --refresh.interval 30s
//! ```

mod backend;
mod config;
mod signal;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use lagwatch_client::ClientManager;
use lagwatch_collector::{Scheduler, SchedulerConfig};
use lagwatch_metrics::ExporterMetrics;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, LogFormat, LogLevel, Settings};

/// How long the scrape server may take to drain once collection stops.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::resolve(cli).context("invalid configuration")?;

    init_tracing(settings.log_level, settings.log_format);

    let backoff = settings.fatal_backoff;
    if let Err(e) = run(settings).await {
        error!(
            error = %format!("{e:#}"),
            backoff_ms = backoff.as_millis() as u64,
            "fatal error, exiting after backoff"
        );
        tokio::time::sleep(backoff).await;
        return Err(e);
    }
    Ok(())
}

/// `RUST_LOG` takes precedence over `--log.level`.
fn init_tracing(level: LogLevel, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    info!(
        seeds = %settings.kafka.bootstrap_servers(),
        listen = %settings.listen_address,
        interval_ms = settings.refresh_interval.as_millis() as u64,
        threshold = settings.continuous_failures.get(),
        "lagwatchd starting"
    );

    // ── Kafka client ───────────────────────────────────────────

    let factory = backend::factory()?;
    let manager = ClientManager::connect(factory, settings.kafka.clone())
        .await
        .context("cannot connect to kafka")?;

    // ── Metrics + scrape server ────────────────────────────────

    let metrics = Arc::new(ExporterMetrics::new().context("cannot register metrics")?);
    let router = lagwatch_api::build_router(metrics.clone());

    let addr = settings.listen_address.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(%addr, "metrics server listening");

    let (server_tx, mut server_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_rx.changed().await;
            })
            .await
    });

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = signal::spawn_handler(shutdown_tx).context("cannot install signal handlers")?;

    // ── Collection (blocks until shutdown or give-up) ──────────

    let config = SchedulerConfig::new(settings.refresh_interval, settings.continuous_failures)
        .with_call_timeout(settings.kafka.timeout);
    let mut scheduler = Scheduler::new(config, manager, metrics);
    let outcome = scheduler.run(shutdown_rx).await;
    scheduler.close().await;
    signals.abort();

    // ── Drain scrape server ────────────────────────────────────

    let _ = server_tx.send(true);
    let drained = match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(anyhow!(e).context("metrics server failed")),
        Ok(Err(e)) => Err(anyhow!(e).context("metrics server task failed")),
        Err(_) => Err(anyhow!(
            "metrics server did not drain within {SERVER_DRAIN_TIMEOUT:?}"
        )),
    };

    outcome.context("collection stopped")?;
    drained?;

    info!("lagwatchd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn refuses_to_start_without_backend() {
        if cfg!(feature = "rdkafka") {
            return;
        }
        let settings = Settings::resolve(Cli::parse_from([
            "lagwatchd",
            "--kafka.servers",
            "localhost:9092",
            "--listen.address",
            "127.0.0.1:0",
        ]))
        .unwrap();

        let err = run(settings).await.unwrap_err();
        assert!(format!("{err:#}").contains("unsupported"), "{err:#}");
    }
}
