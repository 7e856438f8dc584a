use thiserror::Error;

/// Problems setting up a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

/// A batch write that did not land. The writer never retries; the variant
/// tells the caller whether trying again later is worthwhile.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Throttling, timeouts, dropped connections, server-side 5xx.
    #[error("write of {key} failed (retryable): {source}")]
    Retryable {
        key: String,
        #[source]
        source: object_store::Error,
    },

    /// Bad credentials, missing bucket, unsupported operation.
    #[error("write of {key} failed (terminal): {source}")]
    Terminal {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WriteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteError::Retryable { .. })
    }

    /// Sort an object store failure into retryable or terminal.
    pub fn classify(key: impl Into<String>, source: object_store::Error) -> Self {
        let key = key.into();
        let terminal = match &source {
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. }
            | object_store::Error::NotFound { .. }
            | object_store::Error::InvalidPath { .. }
            | object_store::Error::NotSupported { .. }
            | object_store::Error::NotImplemented
            | object_store::Error::UnknownConfigurationKey { .. } => true,
            object_store::Error::Generic { .. } => is_terminal_message(&source.to_string()),
            _ => false,
        };
        if terminal {
            WriteError::Terminal { key, source }
        } else {
            WriteError::Retryable { key, source }
        }
    }
}

/// Provider error codes that will not go away by trying again.
const TERMINAL_MARKERS: &[&str] = &[
    "accessdenied",
    "access denied",
    "nosuchbucket",
    "invalidaccesskeyid",
    "signaturedoesnotmatch",
    "expiredtoken",
    "403 forbidden",
    "401 unauthorized",
];

fn is_terminal_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TERMINAL_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic(msg: &str) -> object_store::Error {
        object_store::Error::Generic {
            store: "S3",
            source: msg.to_string().into(),
        }
    }

    #[test]
    fn auth_failures_are_terminal() {
        let err = WriteError::classify(
            "k",
            object_store::Error::PermissionDenied {
                path: "k".into(),
                source: "denied".into(),
            },
        );
        assert!(!err.is_retryable());
        assert!(!WriteError::classify("k", generic("NoSuchBucket: the bucket does not exist")).is_retryable());
        assert!(!WriteError::classify("k", object_store::Error::NotImplemented).is_retryable());
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(WriteError::classify("k", generic("SlowDown: please reduce your request rate")).is_retryable());
        assert!(WriteError::classify("k", generic("connection reset by peer")).is_retryable());
    }

    #[test]
    fn message_names_the_key() {
        let err = WriteError::classify("clean-data/x.json", generic("timed out"));
        assert!(err.to_string().contains("clean-data/x.json"));
    }
}
