//! What a cycle produced, as handed to the monitor.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::CycleState;

/// The four working stages of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Fetching,
    Validating,
    Detecting,
    Writing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "Fetching",
            Stage::Validating => "Validating",
            Stage::Detecting => "Detecting",
            Stage::Writing => "Writing",
        };
        f.write_str(name)
    }
}

/// Record counts observed so far in a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounts {
    pub fetched: usize,
    pub valid: usize,
    pub invalid: usize,
    pub clean: usize,
    pub anomalous: usize,
}

impl CycleCounts {
    pub fn add(&mut self, other: &CycleCounts) {
        self.fetched += other.fetched;
        self.valid += other.valid;
        self.invalid += other.invalid;
        self.clean += other.clean;
        self.anomalous += other.anomalous;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    Success,
    PartialFailure,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CycleOutcome {
    Success {
        counts: CycleCounts,
        duration: Duration,
        /// Storage key of the written batch; `None` when nothing was written.
        key: Option<String>,
    },
    /// A stage after fetching failed; counts cover the stages that completed.
    PartialFailure {
        stage: Stage,
        error: String,
        retryable: bool,
        counts: CycleCounts,
        duration: Duration,
    },
    /// Fetching failed, so the cycle saw no data at all.
    Failure {
        error: String,
        retryable: bool,
        duration: Duration,
    },
}

impl CycleOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            CycleOutcome::Success { .. } => OutcomeKind::Success,
            CycleOutcome::PartialFailure { .. } => OutcomeKind::PartialFailure,
            CycleOutcome::Failure { .. } => OutcomeKind::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success { .. })
    }

    pub fn counts(&self) -> CycleCounts {
        match self {
            CycleOutcome::Success { counts, .. } | CycleOutcome::PartialFailure { counts, .. } => *counts,
            CycleOutcome::Failure { .. } => CycleCounts::default(),
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            CycleOutcome::Success { duration, .. }
            | CycleOutcome::PartialFailure { duration, .. }
            | CycleOutcome::Failure { duration, .. } => *duration,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CycleOutcome::Success { .. } => None,
            CycleOutcome::PartialFailure { error, .. } | CycleOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// Everything the Reporting stage knows about one finished cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    /// Wall time of each stage that ran, in execution order.
    pub stage_durations: Vec<(Stage, Duration)>,
    /// Every state the engine passed through, from the first stage to Idle.
    pub states: Vec<CycleState>,
}

impl CycleReport {
    /// Whether the engine entered `stage` during this cycle.
    pub fn visited(&self, stage: Stage) -> bool {
        self.stage_durations.iter().any(|(s, _)| *s == stage)
            || self.states.iter().any(|st| st.stage() == Some(stage))
    }
}
