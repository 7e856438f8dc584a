//! Population z-score scorer.
//!
//! For every measurement field the mean and standard deviation are taken over
//! the readings of the current cycle. A reading's score is its largest |z|
//! across fields; fields with no variance or too few observations are
//! skipped. Temperatures outside the configured hard bounds are flagged
//! regardless of score.

use async_trait::async_trait;
use tracing::debug;

use iotpipe_core::config::AnomalyConfig;
use iotpipe_core::{AnomalyVerdict, Measurement, Reading};

use crate::gate::{AnomalyGate, Detection, DetectionError};

#[derive(Debug, Clone, Copy, PartialEq)]
struct FieldStats {
    mean: f64,
    std: f64,
}

/// Mean and population standard deviation of `field` over `readings`.
///
/// `None` when fewer than `min_samples` readings carry the field.
fn field_stats(readings: &[Reading], field: Measurement, min_samples: usize) -> Option<FieldStats> {
    let values: Vec<f64> = readings.iter().filter_map(|r| r.measurement(field)).collect();
    if values.is_empty() || values.len() < min_samples {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(FieldStats { mean, std: var.sqrt() })
}

#[derive(Debug, Clone)]
pub struct ZScoreGate {
    config: AnomalyConfig,
}

impl ZScoreGate {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    fn score(&self, reading: &Reading, stats: &[(Measurement, FieldStats)]) -> (f64, Option<String>) {
        let mut max_z = 0.0_f64;
        let mut worst: Option<Measurement> = None;

        for (field, s) in stats {
            if s.std <= f64::EPSILON {
                continue;
            }
            if let Some(value) = reading.measurement(*field) {
                let z = ((value - s.mean) / s.std).abs();
                if z > max_z {
                    max_z = z;
                    worst = Some(*field);
                }
            }
        }

        let t = reading.temperature;
        if t < self.config.temperature_min || t > self.config.temperature_max {
            let reason = format!(
                "temperature {t} outside [{}, {}]",
                self.config.temperature_min, self.config.temperature_max
            );
            return (max_z, Some(reason));
        }

        match worst {
            Some(field) if max_z > self.config.z_threshold => (
                max_z,
                Some(format!("{field} z-score {max_z:.2} exceeds {}", self.config.z_threshold)),
            ),
            _ => (max_z, None),
        }
    }
}

impl Default for ZScoreGate {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

#[async_trait]
impl AnomalyGate for ZScoreGate {
    async fn detect(&self, valid: &[Reading]) -> Result<Detection, DetectionError> {
        let stats: Vec<(Measurement, FieldStats)> = Measurement::ALL
            .iter()
            .filter_map(|&m| field_stats(valid, m, self.config.min_samples).map(|s| (m, s)))
            .collect();

        let mut detection = Detection::default();
        for reading in valid {
            match self.score(reading, &stats) {
                (score, Some(reason)) => {
                    debug!(sensor_id = %reading.sensor_id, score, %reason, "anomalous reading");
                    detection.anomalous.push(AnomalyVerdict {
                        reading: reading.clone(),
                        is_anomaly: true,
                        score,
                        reason: Some(reason),
                    });
                }
                (_, None) => detection.clean.push(reading.clone()),
            }
        }
        Ok(detection)
    }

    fn name(&self) -> &str {
        "zscore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reading(id: &str, temperature: f64) -> Reading {
        Reading::new(id, Utc::now(), temperature)
    }

    fn gate(min_samples: usize) -> ZScoreGate {
        ZScoreGate::new(AnomalyConfig {
            z_threshold: 2.0,
            min_samples,
            ..AnomalyConfig::default()
        })
    }

    #[test]
    fn stats_need_min_samples() {
        let rs = vec![reading("a", 1.0), reading("b", 3.0)];
        assert!(field_stats(&rs, Measurement::Temperature, 3).is_none());
        let s = field_stats(&rs, Measurement::Temperature, 2).unwrap();
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.std, 1.0);
        assert!(field_stats(&rs, Measurement::Humidity, 1).is_none());
    }

    #[tokio::test]
    async fn outlier_is_flagged_and_partition_is_complete() {
        let mut valid: Vec<Reading> = (0..9).map(|i| reading(&format!("s{i}"), 20.0 + (i % 2) as f64)).collect();
        valid.push(reading("spike", 60.0));

        let detection = gate(5).detect(&valid).await.unwrap();
        assert_eq!(detection.covered(), valid.len());
        assert_eq!(detection.anomalous.len(), 1);
        let verdict = &detection.anomalous[0];
        assert_eq!(verdict.reading.sensor_id, "spike");
        assert!(verdict.is_anomaly);
        assert!(verdict.reason.as_deref().unwrap().contains("temperature"));
    }

    #[tokio::test]
    async fn small_cycles_only_use_hard_bounds() {
        let valid = vec![reading("a", 20.0), reading("b", 500.0)];
        let detection = gate(5).detect(&valid).await.unwrap();
        assert_eq!(detection.clean.len(), 1);
        assert_eq!(detection.anomalous.len(), 1);
        assert!(detection.anomalous[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("outside"));
    }

    #[tokio::test]
    async fn uniform_readings_are_clean() {
        let valid: Vec<Reading> = (0..6).map(|i| reading(&format!("s{i}"), 21.0)).collect();
        let detection = gate(3).detect(&valid).await.unwrap();
        assert_eq!(detection.clean, valid);
        assert!(detection.anomalous.is_empty());
    }

    #[tokio::test]
    async fn empty_input() {
        let detection = ZScoreGate::default().detect(&[]).await.unwrap();
        assert_eq!(detection.covered(), 0);
    }
}
