use thiserror::Error;

/// Startup-time configuration problems. These are the only errors that
/// stop the pipeline before the first cycle.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },

    #[error("{0}")]
    Other(String),
}
