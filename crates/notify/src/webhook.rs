//! Webhook alert delivery.
//!
//! One cycle's anomalies become one JSON [`AlertPayload`] sent to a
//! configured URL. `${VAR}` references in the URL are expanded from the
//! environment when the sink is built, so tokens can stay out of `.env`
//! files checked into deployment repos.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use iotpipe_core::config::AlertConfig;
use iotpipe_core::AnomalyVerdict;

use crate::alert::{AlertPayload, AlertSink};
use crate::error::NotifyError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Posts anomaly payloads to an HTTP endpoint.
#[derive(Debug)]
pub struct WebhookAlertSink {
    url: String,
    method: reqwest::Method,
    client: reqwest::Client,
}

impl WebhookAlertSink {
    /// `method` is case-insensitive and defaults to `POST`.
    pub fn new(url: &str, method: Option<&str>) -> Result<Self, NotifyError> {
        let method = match method {
            Some(m) => m
                .trim()
                .to_uppercase()
                .parse::<reqwest::Method>()
                .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?,
            None => reqwest::Method::POST,
        };
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            url: expand_env(url)?,
            method,
            client,
        })
    }

    /// Build from the alert section of the config; `None` when no webhook
    /// URL is set.
    pub fn from_config(config: &AlertConfig) -> Result<Option<Self>, NotifyError> {
        match &config.webhook_url {
            Some(url) => Self::new(url, config.webhook_method.as_deref()).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alerts(&self, anomalous: &[AnomalyVerdict]) -> Result<(), NotifyError> {
        if anomalous.is_empty() {
            return Ok(());
        }
        let payload = AlertPayload::new(anomalous);

        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(NotifyError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(%status, body = %body, "alert webhook returned non-2xx status");
            return Err(NotifyError::Delivery(format!("{status}: {body}")));
        }

        debug!(
            method = %self.method,
            %status,
            anomalies = payload.anomaly_count,
            "alert delivered"
        );
        Ok(())
    }
}

/// Expand `${NAME}` references from the process environment.
fn expand_env(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| NotifyError::Config(format!("unterminated ${{...}} in {input}")))?;
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| NotifyError::Config(format!("{name} is not set")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::tests::verdict;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    // Accepts one request, answers with `status` plus `headers`, and hands
    // back the raw request text.
    async fn serve_once(status: &'static str, headers: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..end]).to_string();
                    let len = head
                        .lines()
                        .filter_map(|l| l.split_once(':'))
                        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let response = format!("{status}\r\ncontent-length: 0\r\nconnection: close\r\n{headers}\r\n");
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{addr}/hook"), handle)
    }

    #[tokio::test]
    async fn posts_one_payload_per_cycle() {
        let (url, server) = serve_once("HTTP/1.1 204 No Content", "").await;
        let sink = WebhookAlertSink::new(&url, None).unwrap();

        sink.send_alerts(&[verdict("s-1", 99.0), verdict("s-2", 98.0)]).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains("\"event\":\"sensor_anomaly\""));
        assert!(request.contains("\"anomaly_count\":2"));
        assert!(request.contains("\"sensor_ids\":[\"s-1\",\"s-2\"]"));
    }

    #[tokio::test]
    async fn configured_method_is_used() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", "").await;
        let config = AlertConfig {
            webhook_url: Some(url),
            webhook_method: Some("put".into()),
        };
        let sink = WebhookAlertSink::from_config(&config).unwrap().unwrap();
        sink.send_alerts(&[verdict("s-1", 99.0)]).await.unwrap();
        assert!(server.await.unwrap().starts_with("PUT /hook"));
    }

    #[tokio::test]
    async fn throttling_reports_retry_after() {
        let (url, server) = serve_once("HTTP/1.1 429 Too Many Requests", "retry-after: 7\r\n").await;
        let sink = WebhookAlertSink::new(&url, None).unwrap();
        match sink.send_alerts(&[verdict("s-1", 99.0)]).await {
            Err(NotifyError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 7),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_a_delivery_failure() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable", "").await;
        let sink = WebhookAlertSink::new(&url, None).unwrap();
        match sink.send_alerts(&[verdict("s-1", 99.0)]).await {
            Err(NotifyError::Delivery(msg)) => assert!(msg.contains("503")),
            other => panic!("expected Delivery, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn nothing_to_send_makes_no_request() {
        let sink = WebhookAlertSink::new("http://127.0.0.1:9/hook", None).unwrap();
        assert!(sink.send_alerts(&[]).await.is_ok());
    }

    #[test]
    fn unconfigured_webhook_builds_nothing() {
        let config = AlertConfig {
            webhook_url: None,
            webhook_method: Some("POST".into()),
        };
        assert!(WebhookAlertSink::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn bad_method_is_a_config_error() {
        let err = WebhookAlertSink::new("https://example.com", Some("NOT A METHOD")).unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }

    #[test]
    fn env_references_are_expanded() {
        std::env::set_var("IOTPIPE_ALERT_TEST_TOKEN", "t0k3n");
        assert_eq!(
            expand_env("https://hooks.local/${IOTPIPE_ALERT_TEST_TOKEN}/anomaly").unwrap(),
            "https://hooks.local/t0k3n/anomaly"
        );
        std::env::remove_var("IOTPIPE_ALERT_TEST_TOKEN");

        assert_eq!(expand_env("https://plain.local/hook").unwrap(), "https://plain.local/hook");
        assert!(matches!(
            expand_env("https://hooks.local/${IOTPIPE_ALERT_NEVER_SET_91}"),
            Err(NotifyError::Config(msg)) if msg.contains("IOTPIPE_ALERT_NEVER_SET_91")
        ));
        assert!(matches!(expand_env("https://hooks.local/${OPEN"), Err(NotifyError::Config(_))));
    }
}
