//! One-shot replay of a single day's readings.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use iotpipe_ingest::{ReadingSource, TransportError};

use crate::engine::CycleEngine;
use crate::outcome::CycleReport;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch mode requires --date")]
    MissingDate,

    #[error("invalid --date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("failed to build source for {date}: {source}")]
    Source {
        date: NaiveDate,
        #[source]
        source: TransportError,
    },

    #[error("replay of {date} failed: {error}")]
    CycleFailed { date: NaiveDate, error: String },
}

/// Parse the `--date` argument of batch mode.
pub fn parse_batch_date(raw: Option<&str>) -> Result<NaiveDate, BatchError> {
    let raw = raw.ok_or(BatchError::MissingDate)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| BatchError::InvalidDate(raw.to_string()))
}

/// Processes historical data for one calendar date.
#[async_trait]
pub trait BatchDriver: Send {
    async fn process_date(&mut self, date: NaiveDate) -> Result<CycleReport, BatchError>;
}

type SourceFactory = Box<dyn Fn(NaiveDate) -> Result<Box<dyn ReadingSource>, TransportError> + Send>;

/// Replays a date by pointing the engine at a date-pinned source and
/// running exactly one cycle.
pub struct ReplayDriver {
    engine: CycleEngine,
    source_for: SourceFactory,
}

impl ReplayDriver {
    pub fn new<F>(engine: CycleEngine, source_for: F) -> Self
    where
        F: Fn(NaiveDate) -> Result<Box<dyn ReadingSource>, TransportError> + Send + 'static,
    {
        Self {
            engine,
            source_for: Box::new(source_for),
        }
    }
}

#[async_trait]
impl BatchDriver for ReplayDriver {
    async fn process_date(&mut self, date: NaiveDate) -> Result<CycleReport, BatchError> {
        let source = (self.source_for)(date).map_err(|source| BatchError::Source { date, source })?;
        self.engine.replace_source(source);

        info!(%date, "replaying readings");
        let report = self.engine.run_cycle().await;
        match report.outcome.error() {
            None => Ok(report),
            Some(error) => Err(BatchError::CycleFailed {
                date,
                error: error.to_string(),
            }),
        }
    }
}
