use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub aws: AwsConfig,
    pub anomaly: AnomalyConfig,
    pub alerts: AlertConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `IOTPIPE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("IOTPIPE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            source: SourceConfig::from_env_profiled(p),
            pipeline: PipelineConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            anomaly: AnomalyConfig::from_env_profiled(p),
            alerts: AlertConfig::from_env_profiled(p),
        }
    }

    /// Apply a command-line poll interval on top of the profiled value.
    pub fn with_poll_interval(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.pipeline.poll_interval_secs = secs;
        }
        self
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.api_url.trim().is_empty() {
            return Err(ConfigError::Missing("SOURCE_API_URL".into()));
        }
        if self.pipeline.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "POLL_INTERVAL_SECS".into(),
                value: "0".into(),
            });
        }
        if !(self.anomaly.z_threshold > 0.0) {
            return Err(ConfigError::Invalid {
                key: "ANOMALY_Z_THRESHOLD".into(),
                value: self.anomaly.z_threshold.to_string(),
            });
        }
        if self.anomaly.temperature_min >= self.anomaly.temperature_max {
            return Err(ConfigError::Other(format!(
                "TEMPERATURE_MIN ({}) must be below TEMPERATURE_MAX ({})",
                self.anomaly.temperature_min, self.anomaly.temperature_max
            )));
        }
        if self.aws.s3_bucket.as_deref().is_some_and(|b| b.contains('/')) {
            return Err(ConfigError::Invalid {
                key: "S3_BUCKET_NAME".into(),
                value: self.aws.s3_bucket.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  source:    url={}, timeout={}s", self.source.api_url, self.source.timeout_secs);
        tracing::info!("  pipeline:  poll_interval={}s", self.pipeline.poll_interval_secs);
        tracing::info!(
            "  storage:   data_dir={}, keys={}/.../*-{}.json",
            self.storage.data_dir.display(),
            self.storage.key_prefix,
            self.storage.key_suffix
        );
        tracing::info!("  aws:       region={}, bucket={}", self.aws.region, self.aws.s3_bucket.as_deref().unwrap_or("(none)"));
        tracing::info!(
            "  anomaly:   z_threshold={}, min_samples={}, temperature=[{}, {}]",
            self.anomaly.z_threshold,
            self.anomaly.min_samples,
            self.anomaly.temperature_min,
            self.anomaly.temperature_max
        );
        tracing::info!("  alerts:    webhook={}", if self.alerts.is_configured() { "configured" } else { "(none)" });
    }
}

// ── Source ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl SourceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_url: profiled_env_or(p, "SOURCE_API_URL", "http://localhost:8080/api/readings/latest"),
            api_key: profiled_env_opt(p, "SOURCE_API_KEY"),
            timeout_secs: profiled_env_u64(p, "SOURCE_TIMEOUT_SECS", 10),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub poll_interval_secs: u64,
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_secs: profiled_env_u64(p, "POLL_INTERVAL_SECS", 30),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the local backend (used when S3 is not configured).
    pub data_dir: PathBuf,
    pub key_prefix: String,
    pub key_suffix: String,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
            key_prefix: profiled_env_or(p, "KEY_PREFIX", "clean-data"),
            key_suffix: profiled_env_or(p, "KEY_SUFFIX", "readings"),
        }
    }
}

// ── AWS / S3 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "ap-south-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            s3_bucket: profiled_env_opt(p, "S3_BUCKET_NAME"),
            s3_prefix: profiled_env_opt(p, "S3_PREFIX"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.s3_bucket.is_some()
    }
}

// ── Anomaly detection ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    pub z_threshold: f64,
    pub min_samples: usize,
    pub temperature_min: f64,
    pub temperature_max: f64,
}

impl AnomalyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            z_threshold: profiled_env_f64(p, "ANOMALY_Z_THRESHOLD", 3.0),
            min_samples: profiled_env_usize(p, "ANOMALY_MIN_SAMPLES", 5),
            temperature_min: profiled_env_f64(p, "TEMPERATURE_MIN", -40.0),
            temperature_max: profiled_env_f64(p, "TEMPERATURE_MAX", 85.0),
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            min_samples: 5,
            temperature_min: -40.0,
            temperature_max: 85.0,
        }
    }
}

// ── Alerts ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
    pub webhook_method: Option<String>,
}

impl AlertConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "ALERT_WEBHOOK_URL"),
            webhook_method: profiled_env_opt(p, "ALERT_WEBHOOK_METHOD"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }
}
