use async_trait::async_trait;
use thiserror::Error;

use iotpipe_core::{AnomalyVerdict, Reading};

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("anomaly model unavailable: {0}")]
    Unavailable(String),

    #[error("anomaly model failed: {0}")]
    Model(String),

    #[error("partition covers {covered} readings, expected {expected}")]
    PartitionMismatch { covered: usize, expected: usize },
}

/// Readings split by the anomaly model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub clean: Vec<Reading>,
    pub anomalous: Vec<AnomalyVerdict>,
}

impl Detection {
    /// Number of input readings this partition accounts for.
    pub fn covered(&self) -> usize {
        self.clean.len() + self.anomalous.len()
    }

    /// Fail unless the partition accounts for exactly `expected` readings.
    pub fn ensure_covers(&self, expected: usize) -> Result<(), DetectionError> {
        let covered = self.covered();
        if covered == expected {
            Ok(())
        } else {
            Err(DetectionError::PartitionMismatch { covered, expected })
        }
    }
}

/// Pluggable anomaly model.
///
/// Implementations must not keep references into `valid` and must return
/// every input reading exactly once, either in `clean` or in `anomalous`.
/// Output need not be identical between calls with the same input.
#[async_trait]
pub trait AnomalyGate: Send + Sync {
    async fn detect(&self, valid: &[Reading]) -> Result<Detection, DetectionError>;

    fn name(&self) -> &str;
}
