/// Why an alert did not reach its destination.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("alert request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("alert webhook misconfigured: {0}")]
    Config(String),

    #[error("alert webhook rejected delivery: {0}")]
    Delivery(String),

    #[error("alert webhook throttled, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}
