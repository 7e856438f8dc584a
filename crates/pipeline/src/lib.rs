//! The cycle engine: fetch → validate → detect → alert → write → report,
//! once per pacing tick, with every failure contained to its own cycle.

pub mod batch;
pub mod engine;
pub mod monitor;
pub mod outcome;
pub mod pacer;

pub use batch::{parse_batch_date, BatchDriver, BatchError, ReplayDriver};
pub use engine::{CycleEngine, CycleState, StageError};
pub use monitor::{CycleMonitor, MetricsSink, MonitorSnapshot};
pub use outcome::{CycleCounts, CycleOutcome, CycleReport, OutcomeKind, Stage};
pub use pacer::{FixedInterval, Pacer};
