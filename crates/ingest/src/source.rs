//! Upstream reading sources.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use iotpipe_core::config::SourceConfig;
use iotpipe_core::RawReading;

/// Failures talking to the reading source.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl TransportError {
    /// Whether a later attempt could plausibly succeed. Client build errors
    /// and malformed requests are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_body()
            }
            TransportError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            TransportError::Payload(_) => false,
        }
    }
}

/// Anything that can hand the pipeline the latest batch of raw readings.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Fetch whatever the source currently considers the latest readings.
    ///
    /// Returns an empty vec when nothing new is available.
    async fn fetch_latest_readings(&self) -> Result<Vec<RawReading>, TransportError>;

    /// Human-readable name used in logs.
    fn name(&self) -> &str;
}

/// REST polling client for the sensor API.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    /// Historical date to request instead of "latest".
    date: Option<NaiveDate>,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| TransportError::Request {
                url: config.api_url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            date: None,
        })
    }

    /// Pin every fetch to one calendar day (`?date=YYYY-MM-DD`).
    pub fn for_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

#[async_trait]
impl ReadingSource for HttpSource {
    async fn fetch_latest_readings(&self) -> Result<Vec<RawReading>, TransportError> {
        let mut request = self.client.get(&self.url);
        if let Some(date) = self.date {
            request = request.query(&[("date", date.format("%Y-%m-%d").to_string())]);
        }
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|source| TransportError::Request {
            url: self.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await.map_err(|source| TransportError::Request {
            url: self.url.clone(),
            source,
        })?;
        let records = extract_records(payload)?;
        debug!(url = %self.url, records = records.len(), "fetched readings");
        Ok(records)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Pull the record list out of a source payload.
///
/// Accepts a bare JSON array or an object carrying the array under
/// `readings` or `data`. Non-object elements are dropped.
pub fn extract_records(payload: Value) -> Result<Vec<RawReading>, TransportError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("readings").or_else(|| obj.remove("data")) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(TransportError::Payload(format!(
                    "record list is not an array: {other}"
                )))
            }
            None => {
                return Err(TransportError::Payload(
                    "object payload has no 'readings' or 'data' field".into(),
                ))
            }
        },
        other => {
            return Err(TransportError::Payload(format!(
                "expected array or object, got {other}"
            )))
        }
    };

    let total = items.len();
    let records: Vec<RawReading> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if records.len() < total {
        warn!(dropped = total - records.len(), "dropped non-object records from payload");
    }
    Ok(records)
}
