//! pipeline-worker — runs the sensor data-collection cycle.
//!
//! `--mode realtime` polls the sensor API on a fixed interval until Ctrl-C.
//! `--mode batch --date YYYY-MM-DD` replays one day and exits.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::Notify;
use tracing::{info, warn};

use iotpipe_compute::ZScoreGate;
use iotpipe_core::config::load_dotenv;
use iotpipe_core::Config;
use iotpipe_ingest::{HttpSource, ReadingSource};
use iotpipe_notify::{AlertSink, LogAlertSink, WebhookAlertSink};
use iotpipe_pipeline::{parse_batch_date, BatchDriver, CycleEngine, CycleMonitor, FixedInterval, ReplayDriver};
use iotpipe_storage::{PartitionedWriter, StorageBackend};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Realtime,
    Batch,
}

/// IoT sensor pipeline worker — fetch, validate, detect, alert, store.
#[derive(Parser, Debug)]
#[command(name = "pipeline-worker", version, about)]
struct Cli {
    /// Run continuously or replay a single date.
    #[arg(long, value_enum, env = "PIPELINE_MODE", default_value_t = Mode::Realtime)]
    mode: Mode,

    /// Date to replay in batch mode (YYYY-MM-DD).
    #[arg(long)]
    date: Option<String>,

    /// Seconds between cycles; overrides the profile's poll interval.
    #[arg(long)]
    poll_interval: Option<u64>,
}

// ── wiring ──────────────────────────────────────────────────────────

fn build_alerts(config: &Config) -> anyhow::Result<Box<dyn AlertSink>> {
    match WebhookAlertSink::from_config(&config.alerts).context("invalid alert webhook configuration")? {
        Some(webhook) => {
            info!("anomaly alerts go to webhook");
            Ok(Box::new(webhook))
        }
        None => {
            info!("no alert webhook configured, anomalies are logged only");
            Ok(Box::new(LogAlertSink))
        }
    }
}

fn build_engine(
    config: &Config,
    source: Box<dyn ReadingSource>,
    monitor: Arc<CycleMonitor>,
) -> anyhow::Result<CycleEngine> {
    let backend = StorageBackend::from_config(&config.aws, &config.storage).context("storage backend")?;
    info!(remote = backend.is_remote(), target = %backend.uri(""), "storage backend ready");

    let writer = PartitionedWriter::new(
        backend,
        config.storage.key_prefix.clone(),
        config.storage.key_suffix.clone(),
    );

    Ok(CycleEngine::new(
        source,
        Box::new(ZScoreGate::new(config.anomaly.clone())),
        build_alerts(config)?,
        Box::new(writer),
        monitor,
    ))
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env().with_poll_interval(cli.poll_interval);
    config.log_summary();
    config.validate().context("invalid configuration")?;
    let monitor = Arc::new(CycleMonitor::init());

    match cli.mode {
        Mode::Realtime => {
            let source = HttpSource::new(&config.source).context("sensor API client")?;
            let mut engine = build_engine(&config, Box::new(source), monitor.clone())?;

            let interval = config.pipeline.poll_interval_secs;
            let mut pacer = FixedInterval::from_secs(interval);

            let shutdown = Arc::new(Notify::new());
            let stop = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("interrupt received, stopping after the current cycle");
                        stop.notify_one();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for interrupt"),
                }
            });

            info!(interval_secs = interval, "pipeline-worker starting in realtime mode");
            let cycles = engine.run(&mut pacer, shutdown).await;

            let snapshot = monitor.snapshot();
            info!(
                cycles,
                successes = snapshot.successes,
                partial_failures = snapshot.partial_failures,
                failures = snapshot.failures,
                "pipeline-worker exited cleanly"
            );
        }
        Mode::Batch => {
            let date = parse_batch_date(cli.date.as_deref())?;
            let source_config = config.source.clone();
            let initial = HttpSource::new(&source_config).context("sensor API client")?;
            let engine = build_engine(&config, Box::new(initial), monitor.clone())?;

            let mut driver = ReplayDriver::new(engine, move |date| {
                Ok(Box::new(HttpSource::new(&source_config)?.for_date(date)) as Box<dyn ReadingSource>)
            });

            info!(%date, "pipeline-worker starting in batch mode");
            let report = driver.process_date(date).await?;
            let counts = report.outcome.counts();
            info!(
                %date,
                fetched = counts.fetched,
                clean = counts.clean,
                anomalous = counts.anomalous,
                "batch replay complete"
            );
        }
    }

    Ok(())
}
