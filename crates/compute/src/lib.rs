//! Anomaly detection over validated readings.
//!
//! The pipeline only knows the [`AnomalyGate`] trait; [`ZScoreGate`] is the
//! in-process scorer used when no external model is wired in.

pub mod gate;
pub mod zscore;

pub use gate::{AnomalyGate, Detection, DetectionError};
pub use zscore::ZScoreGate;
