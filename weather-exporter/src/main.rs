//! Binary crate for the `weather-exporter` daemon.
//!
//! This crate focuses on:
//! - Structured logging setup
//! - Fatal startup (providers, metrics exporter)
//! - Running the poll loop until SIGINT/SIGTERM, then flushing metrics

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use weather_core::{
    Config, PollSchedule, ProviderId, Recorder, metrics::exporter, poller, provider_from_config,
};

mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loaded = Config::load();
    logging::init(&log_filter(&loaded))?;
    let config = loaded.inspect_err(|e| {
        error!(error = %format!("{e:#}"), "Failed to load configuration");
    })?;

    if let Err(e) = run(config).await {
        error!(error = %format!("{e:#}"), "Fatal error");
        return Err(e);
    }
    Ok(())
}

/// Logging comes up before a config error is reported, using the defaults.
fn log_filter(loaded: &anyhow::Result<Config>) -> String {
    match loaded {
        Ok(config) => config.log_filter.clone(),
        Err(_) => Config::default().log_filter,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        latitude = config.target.latitude,
        longitude = config.target.longitude,
        "Starting weather exporter"
    );

    let mut schedules = Vec::with_capacity(ProviderId::all().len());
    for &id in ProviderId::all() {
        let provider = provider_from_config(id, &config)
            .await
            .with_context(|| format!("Failed to initialize {id}"))?;
        schedules.push(PollSchedule::from_config(provider, &config));
    }

    let (guard, sink) =
        exporter::init_exporter(&config.metrics).context("Failed to initialize metrics exporter")?;
    let recorder = Recorder::new(Arc::new(sink));

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    poller::run(schedules, recorder, shutdown).await;

    // Shutdown blocks on the final export.
    tokio::task::spawn_blocking(move || guard.shutdown())
        .await
        .context("Metrics flush task failed")?;

    info!("Weather exporter stopped");
    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
