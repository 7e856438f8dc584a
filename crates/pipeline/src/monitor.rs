//! Process-wide cycle bookkeeping.
//!
//! The engine hands every finished [`CycleReport`] to the monitor during its
//! Reporting stage. Recording never fails the cycle: a poisoned lock is
//! logged and recovered.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::outcome::{CycleCounts, CycleOutcome, CycleReport, OutcomeKind, Stage};

/// Aggregated view of every cycle recorded since init or the last reset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSnapshot {
    pub started_at: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub successes: u64,
    pub partial_failures: u64,
    pub failures: u64,
    /// Record counts summed over all cycles.
    pub totals: CycleCounts,
    pub avg_cycle_duration: Duration,
    pub avg_stage_duration: HashMap<Stage, Duration>,
    pub stage_runs: HashMap<Stage, u64>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<OutcomeKind>,
    pub last_error: Option<String>,
    /// Storage key of the most recently written batch.
    pub last_key: Option<String>,
    pub last_report: Option<CycleReport>,
}

impl MonitorSnapshot {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match report.outcome.kind() {
            OutcomeKind::Success => self.successes += 1,
            OutcomeKind::PartialFailure => self.partial_failures += 1,
            OutcomeKind::Failure => self.failures += 1,
        }
        self.totals.add(&report.outcome.counts());
        self.avg_cycle_duration =
            incremental_mean(self.avg_cycle_duration, report.outcome.duration(), self.cycles);

        for (stage, duration) in &report.stage_durations {
            let runs = self.stage_runs.entry(*stage).or_default();
            *runs += 1;
            let prev = self.avg_stage_duration.get(stage).copied().unwrap_or_default();
            self.avg_stage_duration
                .insert(*stage, incremental_mean(prev, *duration, *runs));
        }

        self.last_cycle_at = Some(report.started_at);
        self.last_outcome = Some(report.outcome.kind());
        if let Some(err) = report.outcome.error() {
            self.last_error = Some(err.to_string());
        }
        if let CycleOutcome::Success { key: Some(key), .. } = &report.outcome {
            self.last_key = Some(key.clone());
        }
        self.last_report = Some(report.clone());
    }
}

/// Receives every finished cycle report. Implementations must not fail or
/// block for long; the engine calls this inline during Reporting.
pub trait MetricsSink: Send + Sync {
    fn record(&self, report: &CycleReport);
}

// new_avg = prev_avg + (sample - prev_avg) / count
fn incremental_mean(prev: Duration, sample: Duration, count: u64) -> Duration {
    if count <= 1 {
        return sample;
    }
    let prev_nanos = prev.as_nanos() as f64;
    let cur_nanos = sample.as_nanos() as f64;
    let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
    Duration::from_nanos(avg_nanos as u64)
}

/// Shared cycle monitor. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct CycleMonitor {
    inner: Mutex<MonitorSnapshot>,
}

impl CycleMonitor {
    /// A fresh monitor with its start time set to now.
    pub fn init() -> Self {
        Self {
            inner: Mutex::new(MonitorSnapshot {
                started_at: Some(Utc::now()),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorSnapshot> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("cycle monitor lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn record(&self, report: &CycleReport) {
        self.lock().record(report);
        info!(
            cycle_id = %report.cycle_id,
            outcome = ?report.outcome.kind(),
            duration_ms = report.outcome.duration().as_millis() as u64,
            "cycle recorded"
        );
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.lock().clone()
    }

    /// Clear all counters and restart the clock.
    pub fn reset(&self) {
        *self.lock() = MonitorSnapshot {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
    }
}

impl MetricsSink for CycleMonitor {
    fn record(&self, report: &CycleReport) {
        CycleMonitor::record(self, report);
    }
}
