//! Date-partitioned batch persistence.
//!
//! Each batch becomes exactly one JSON object at
//! `prefix/year=YYYY/month=MM/day=DD/HH-MM-SS-suffix.json`, keyed by the
//! batch's generation time in UTC. Keys have second granularity: one writer
//! must not produce two batches within the same second.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use object_store::path::Path;
use object_store::{Attribute, Attributes, PutOptions, PutPayload};
use serde::Serialize;
use tracing::{info, warn};

use iotpipe_core::{Batch, Reading};

use crate::backend::StorageBackend;
use crate::error::WriteError;

/// Value of the `pipeline` metadata entry on every object.
pub const PIPELINE_NAME: &str = "iot-realtime-data-pipeline";

/// Result of a successful write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written {
        key: String,
        uri: String,
        record_count: usize,
    },
    /// Nothing to persist; no object was written.
    Skipped { reason: String },
}

impl WriteOutcome {
    pub fn key(&self) -> Option<&str> {
        match self {
            WriteOutcome::Written { key, .. } => Some(key),
            WriteOutcome::Skipped { .. } => None,
        }
    }
}

/// Anything that can persist a batch as one unit.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    async fn write(&self, batch: &Batch) -> Result<WriteOutcome, WriteError>;
}

/// Storage key for a batch generated at `at`.
pub fn partition_key(prefix: &str, suffix: &str, at: DateTime<Utc>) -> String {
    let partitions = at.format("year=%Y/month=%m/day=%d");
    let time = at.format("%H-%M-%S");
    let leaf = if suffix.is_empty() {
        format!("{time}.json")
    } else {
        format!("{time}-{suffix}.json")
    };
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{partitions}/{leaf}")
    } else {
        format!("{prefix}/{partitions}/{leaf}")
    }
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    pipeline_version: &'a str,
    upload_timestamp: String,
    record_count: usize,
    records: &'a [Reading],
}

/// Writes batches under date-partitioned keys.
pub struct PartitionedWriter {
    backend: StorageBackend,
    prefix: String,
    suffix: String,
}

impl PartitionedWriter {
    pub fn new(backend: StorageBackend, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    pub fn key_for(&self, batch: &Batch) -> String {
        partition_key(&self.prefix, &self.suffix, batch.generated_at())
    }

    fn metadata(batch: &Batch, upload_timestamp: &str) -> [(&'static str, String); 4] {
        [
            ("record-count", batch.record_count().to_string()),
            ("upload-timestamp", upload_timestamp.to_string()),
            ("pipeline-version", batch.schema_version().to_string()),
            ("pipeline", PIPELINE_NAME.to_string()),
        ]
    }
}

#[async_trait]
impl BatchWriter for PartitionedWriter {
    async fn write(&self, batch: &Batch) -> Result<WriteOutcome, WriteError> {
        if batch.is_empty() {
            warn!("No data to upload");
            return Ok(WriteOutcome::Skipped {
                reason: "empty data".into(),
            });
        }

        let key = self.key_for(batch);
        let upload_timestamp = batch
            .generated_at()
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let body = serde_json::to_vec_pretty(&BatchPayload {
            pipeline_version: batch.schema_version(),
            upload_timestamp: upload_timestamp.clone(),
            record_count: batch.record_count(),
            records: batch.readings(),
        })?;

        let path = Path::from(self.backend.object_path(&key).as_str());
        let payload = PutPayload::from(Bytes::from(body));
        let store = self.backend.store();

        let result = if self.backend.supports_attributes() {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, "application/json".into());
            for (name, value) in Self::metadata(batch, &upload_timestamp) {
                attributes.insert(Attribute::Metadata(name.into()), value.into());
            }
            let opts = PutOptions {
                attributes,
                ..Default::default()
            };
            store.put_opts(&path, payload, opts).await
        } else {
            store.put(&path, payload).await
        };

        if let Err(e) = result {
            let err = WriteError::classify(key, e);
            warn!(error = %err, retryable = err.is_retryable(), "batch upload failed");
            return Err(err);
        }

        let uri = self.backend.uri(&key);
        info!(records = batch.record_count(), %uri, "uploaded batch");
        Ok(WriteOutcome::Written {
            key,
            uri,
            record_count: batch.record_count(),
        })
    }
}
