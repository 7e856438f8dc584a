//! The data-collection cycle.
//!
//! Each cycle walks `Idle → Fetching → Validating → Detecting → Writing →
//! Reporting → Idle`. Empty fetches and all-invalid batches skip straight to
//! Reporting. A failing stage moves the engine to `FailedStage`, the partial
//! result is still reported, and the engine returns to Idle ready for the
//! next tick. Nothing a stage does can stop the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use iotpipe_compute::{AnomalyGate, DetectionError};
use iotpipe_core::Batch;
use iotpipe_ingest::{ReadingSource, TransportError, Validation, Validator};
use iotpipe_notify::AlertSink;
use iotpipe_storage::{BatchWriter, WriteError};

use crate::monitor::MetricsSink;
use crate::outcome::{CycleCounts, CycleOutcome, CycleReport, Stage};
use crate::pacer::Pacer;

/// Where the engine currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CycleState {
    Idle,
    Fetching,
    Validating,
    Detecting,
    Writing,
    Reporting,
    FailedStage { stage: Stage, error: String },
}

impl CycleState {
    /// The working stage this state belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            CycleState::Fetching => Some(Stage::Fetching),
            CycleState::Validating => Some(Stage::Validating),
            CycleState::Detecting => Some(Stage::Detecting),
            CycleState::Writing => Some(Stage::Writing),
            CycleState::FailedStage { stage, .. } => Some(*stage),
            CycleState::Idle | CycleState::Reporting => None,
        }
    }
}

/// Error raised by a single stage of a cycle.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl StageError {
    /// Whether repeating the stage on a later cycle could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::Transport(e) => e.is_retryable(),
            StageError::Detection(DetectionError::Unavailable(_)) => true,
            StageError::Detection(_) => false,
            StageError::Write(e) => e.is_retryable(),
        }
    }
}

type StageResult<T> = Result<T, (Stage, StageError)>;

// Per-cycle accumulator, turned into a CycleReport at the end.
#[derive(Default)]
struct CycleTrace {
    counts: CycleCounts,
    stage_durations: Vec<(Stage, Duration)>,
    states: Vec<CycleState>,
}

impl CycleTrace {
    fn finish(&mut self, stage: Stage, started: Instant) {
        self.stage_durations.push((stage, started.elapsed()));
    }
}

/// Drives fetch → validate → detect → alert → write → report.
pub struct CycleEngine {
    source: Box<dyn ReadingSource>,
    validator: Validator,
    gate: Box<dyn AnomalyGate>,
    alerts: Box<dyn AlertSink>,
    writer: Box<dyn BatchWriter>,
    metrics: Arc<dyn MetricsSink>,
    state: CycleState,
}

impl CycleEngine {
    pub fn new(
        source: Box<dyn ReadingSource>,
        gate: Box<dyn AnomalyGate>,
        alerts: Box<dyn AlertSink>,
        writer: Box<dyn BatchWriter>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            source,
            validator: Validator::new(),
            gate,
            alerts,
            writer,
            metrics,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// Swap the reading source between cycles.
    pub fn replace_source(&mut self, source: Box<dyn ReadingSource>) {
        self.source = source;
    }

    fn enter(&mut self, state: CycleState, visited: &mut Vec<CycleState>) {
        debug!(from = ?self.state, to = ?state, "cycle state transition");
        visited.push(state.clone());
        self.state = state;
    }

    /// Run exactly one cycle and return its report.
    ///
    /// Never fails: every stage error is captured in the report's outcome.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id, source = self.source.name());
        self.run_cycle_inner(cycle_id).instrument(span).await
    }

    async fn run_cycle_inner(&mut self, cycle_id: Uuid) -> CycleReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut trace = CycleTrace::default();

        let result = self.execute(&mut trace).await;
        let duration = started.elapsed();
        let counts = trace.counts;

        let outcome = match result {
            Ok(key) => {
                info!(
                    fetched = counts.fetched,
                    valid = counts.valid,
                    invalid = counts.invalid,
                    clean = counts.clean,
                    anomalous = counts.anomalous,
                    key = key.as_deref().unwrap_or(""),
                    duration_ms = duration.as_millis() as u64,
                    "cycle complete"
                );
                CycleOutcome::Success {
                    counts,
                    duration,
                    key,
                }
            }
            Err((stage, err)) => {
                let retryable = err.is_retryable();
                let message = err.to_string();
                error!(%stage, error = %message, retryable, "cycle stage failed");
                self.enter(
                    CycleState::FailedStage {
                        stage,
                        error: message.clone(),
                    },
                    &mut trace.states,
                );
                if stage == Stage::Fetching {
                    CycleOutcome::Failure {
                        error: message,
                        retryable,
                        duration,
                    }
                } else {
                    CycleOutcome::PartialFailure {
                        stage,
                        error: message,
                        retryable,
                        counts,
                        duration,
                    }
                }
            }
        };

        self.enter(CycleState::Reporting, &mut trace.states);
        let mut report = CycleReport {
            cycle_id,
            started_at,
            outcome,
            stage_durations: trace.stage_durations,
            states: trace.states,
        };
        self.metrics.record(&report);

        self.enter(CycleState::Idle, &mut report.states);
        report
    }

    // Returns the written key, or None when nothing was written.
    async fn execute(&mut self, trace: &mut CycleTrace) -> StageResult<Option<String>> {
        self.enter(CycleState::Fetching, &mut trace.states);
        let started = Instant::now();
        let fetched = self.source.fetch_latest_readings().await;
        trace.finish(Stage::Fetching, started);
        let raw = fetched.map_err(|e| (Stage::Fetching, StageError::from(e)))?;
        trace.counts.fetched = raw.len();
        if raw.is_empty() {
            info!("no readings fetched");
            return Ok(None);
        }

        self.enter(CycleState::Validating, &mut trace.states);
        let started = Instant::now();
        let Validation { valid, invalid } = self.validator.validate(raw);
        trace.finish(Stage::Validating, started);
        trace.counts.valid = valid.len();
        trace.counts.invalid = invalid.len();
        for verdict in &invalid {
            debug!(errors = ?verdict.messages(), "rejected reading");
        }
        if !invalid.is_empty() {
            warn!(invalid = invalid.len(), valid = valid.len(), "readings failed validation");
        }
        if valid.is_empty() {
            info!("no valid readings this cycle");
            return Ok(None);
        }

        self.enter(CycleState::Detecting, &mut trace.states);
        let started = Instant::now();
        let detected = self
            .gate
            .detect(&valid)
            .await
            .and_then(|d| d.ensure_covers(valid.len()).map(|()| d));
        trace.finish(Stage::Detecting, started);
        let detection = detected.map_err(|e| (Stage::Detecting, StageError::from(e)))?;
        trace.counts.clean = detection.clean.len();
        trace.counts.anomalous = detection.anomalous.len();
        drop(valid);

        if !detection.anomalous.is_empty() {
            warn!(anomalous = detection.anomalous.len(), gate = self.gate.name(), "anomalies detected");
            if let Err(e) = self.alerts.send_alerts(&detection.anomalous).await {
                warn!(error = %e, "alert delivery failed");
            }
        }

        self.enter(CycleState::Writing, &mut trace.states);
        let started = Instant::now();
        let batch = Batch::new(detection.clean, Utc::now());
        let written = self.writer.write(&batch).await;
        trace.finish(Stage::Writing, started);
        let written = written.map_err(|e| (Stage::Writing, StageError::from(e)))?;

        Ok(written.key().map(str::to_string))
    }

    /// Run cycles until `shutdown` is notified.
    ///
    /// Stop requests are only honoured while Idle: a notification that
    /// arrives mid-cycle lets the cycle finish and then ends the loop before
    /// the next one starts. Returns the number of cycles run.
    pub async fn run(&mut self, pacer: &mut dyn Pacer, shutdown: Arc<Notify>) -> u64 {
        let mut cycles = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    info!(cycles, "stop requested, engine idle");
                    break;
                }
                _ = pacer.tick() => {}
            }

            let report = self.run_cycle().await;
            cycles += 1;
            if !report.outcome.is_success() {
                debug!(cycle_id = %report.cycle_id, "cycle finished with errors, continuing");
            }
        }
        cycles
    }
}
