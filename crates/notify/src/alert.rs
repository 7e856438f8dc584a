//! The alert seam between the pipeline engine and the outside world.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use iotpipe_core::AnomalyVerdict;

use crate::error::NotifyError;

/// Receives the anomalous readings of a cycle.
///
/// The engine awaits the call but only logs a returned error; alerting never
/// decides whether a cycle succeeded.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alerts(&self, anomalous: &[AnomalyVerdict]) -> Result<(), NotifyError>;
}

/// The JSON document sent for one cycle's anomalies.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload<'a> {
    pub event: &'static str,
    pub subject: String,
    pub anomaly_count: usize,
    /// Distinct sensors involved, sorted.
    pub sensor_ids: Vec<&'a str>,
    pub anomalies: &'a [AnomalyVerdict],
}

impl<'a> AlertPayload<'a> {
    pub const EVENT: &'static str = "sensor_anomaly";

    pub fn new(anomalous: &'a [AnomalyVerdict]) -> Self {
        let mut sensor_ids: Vec<&str> = anomalous.iter().map(|v| v.reading.sensor_id.as_str()).collect();
        sensor_ids.sort_unstable();
        sensor_ids.dedup();

        Self {
            event: Self::EVENT,
            subject: format!(
                "[ALERT] {} anomalous reading(s) from {} sensor(s)",
                anomalous.len(),
                sensor_ids.len()
            ),
            anomaly_count: anomalous.len(),
            sensor_ids,
            anomalies: anomalous,
        }
    }
}

/// Logs anomalies instead of delivering them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send_alerts(&self, anomalous: &[AnomalyVerdict]) -> Result<(), NotifyError> {
        for v in anomalous {
            warn!(
                sensor_id = %v.reading.sensor_id,
                temperature = v.reading.temperature,
                score = v.score,
                reason = v.reason.as_deref().unwrap_or(""),
                "anomalous reading"
            );
        }
        Ok(())
    }
}
