//! Periodic polling of every configured provider.
//!
//! Each provider gets its own task and interval, so a slow or failing source
//! never holds up the other one. Tasks send a [`TickReport`] per tick to a
//! single coordinator, which records successes and logs failures. Nothing is
//! retried: the next scheduled tick is the retry.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    WeatherRecord,
    config::Config,
    error::{ProviderError, error_chain},
    metrics::Recorder,
    provider::{ProviderId, WeatherProvider},
};

/// A provider and how often to poll it.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    pub provider: Arc<dyn WeatherProvider>,
    pub period: Duration,
}

impl PollSchedule {
    pub fn new(provider: Arc<dyn WeatherProvider>, period: Duration) -> Self {
        Self { provider, period }
    }

    pub fn from_config(provider: Arc<dyn WeatherProvider>, config: &Config) -> Self {
        let period = config.poll_interval(provider.id());
        Self::new(provider, period)
    }
}

/// Outcome of one fetch-and-map cycle.
#[derive(Debug)]
pub struct TickReport {
    pub source: ProviderId,
    pub result: Result<WeatherRecord, ProviderError>,
}

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub ticks: u64,
    pub recorded: u64,
    pub failed: u64,
}

/// Poll every schedule until `shutdown` is cancelled.
///
/// Returns once all polling tasks have stopped. Flushing the exporter is left
/// to the caller.
pub async fn run(
    schedules: Vec<PollSchedule>,
    recorder: Recorder,
    shutdown: CancellationToken,
) -> PollSummary {
    let (tx, mut rx) = mpsc::channel(schedules.len().max(1) * 4);
    let mut tasks = JoinSet::new();

    for schedule in schedules {
        info!(
            source = %schedule.provider.id(),
            period_secs = schedule.period.as_secs(),
            "Starting poller"
        );
        tasks.spawn(poll_source(schedule, tx.clone(), shutdown.clone()));
    }
    drop(tx);

    let summary = coordinate(&mut rx, &recorder, &shutdown).await;

    // Unblocks any poller waiting on a full channel.
    drop(rx);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Poller task panicked");
        }
    }

    info!(
        ticks = summary.ticks,
        recorded = summary.recorded,
        failed = summary.failed,
        "Poll loop stopped"
    );
    summary
}

/// Record reports until shutdown or until every sender is gone.
///
/// Reports already queued when shutdown fires are still recorded.
async fn coordinate(
    rx: &mut mpsc::Receiver<TickReport>,
    recorder: &Recorder,
    shutdown: &CancellationToken,
) -> PollSummary {
    let mut summary = PollSummary::default();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            report = rx.recv() => match report {
                Some(report) => handle_report(recorder, report, &mut summary),
                None => return summary,
            },
        }
    }

    while let Ok(report) = rx.try_recv() {
        handle_report(recorder, report, &mut summary);
    }
    summary
}

async fn poll_source(
    schedule: PollSchedule,
    tx: mpsc::Sender<TickReport>,
    shutdown: CancellationToken,
) {
    let source = schedule.provider.id();

    // First tick fires one full period after start.
    let mut ticker = time::interval_at(Instant::now() + schedule.period, schedule.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = schedule.provider.fetch() => result,
        };

        if tx.send(TickReport { source, result }).await.is_err() {
            break;
        }
    }

    debug!(%source, "Poller stopped");
}

fn handle_report(recorder: &Recorder, report: TickReport, summary: &mut PollSummary) {
    summary.ticks += 1;
    let source = report.source;

    match report.result {
        Ok(record) => match recorder.record(source.as_str(), &record) {
            Ok(()) => {
                summary.recorded += 1;
                debug!(
                    %source,
                    temperature_c = record.temperature_c,
                    pressure_hpa = record.pressure_hpa,
                    humidity_pct = record.humidity_pct,
                    condition = %record.condition,
                    "Tick recorded"
                );
            }
            Err(e) => {
                summary.failed += 1;
                error!(%source, error = %e, "Failed to record measurements");
            }
        },
        Err(e) => {
            summary.failed += 1;
            error!(
                %source,
                kind = ?e.kind(),
                error = %error_chain(&e),
                "Failed to fetch current conditions"
            );
        }
    }
}
