//! Alert delivery for anomalous readings.
//!
//! The engine only sees [`AlertSink`]. Two sinks exist: a webhook that posts
//! one JSON payload per cycle, and a sink that only logs.

pub mod alert;
pub mod error;
pub mod webhook;

pub use alert::{AlertPayload, AlertSink, LogAlertSink};
pub use error::NotifyError;
pub use webhook::WebhookAlertSink;
