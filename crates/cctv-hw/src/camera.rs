//! HTTP client for the ESP32-CAM peripheral.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeripheralError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected reply from camera: {0:?}")]
    UnexpectedReply(String),
}

/// Camera/sensor state as reported by the peripheral.
///
/// Missing fields take their offline defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralStatus {
    pub status: String,
    pub motion: bool,
    pub buzzer: bool,
    pub pir_connected: bool,
    pub motion_count: u64,
}

impl Default for PeripheralStatus {
    fn default() -> Self {
        Self {
            status: "Offline".to_string(),
            motion: false,
            buzzer: false,
            pir_connected: false,
            motion_count: 0,
        }
    }
}

/// Bounded retry with exponential backoff for status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Wait after the first failed attempt; doubled after each further failure.
    pub initial_backoff: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(3),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

/// ESP32-CAM handle.
#[derive(Debug, Clone)]
pub struct Esp32Cam {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl Esp32Cam {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.retry.timeout
    }

    /// Poll the camera's status, retrying with backoff.
    ///
    /// Never fails: once every attempt is exhausted the offline default is returned.
    pub async fn status(&self) -> PeripheralStatus {
        for attempt in 0..self.retry.attempts {
            match self.fetch_status().await {
                Ok(status) => {
                    tracing::info!(attempt = attempt + 1, "camera status check succeeded");
                    return status;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.retry.attempts,
                        error = %e,
                        "camera status check failed"
                    );
                    if attempt + 1 == self.retry.attempts {
                        tracing::error!(attempts = self.retry.attempts, "camera unreachable; reporting offline");
                    }
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                }
            }
        }
        PeripheralStatus::default()
    }

    async fn fetch_status(&self) -> Result<PeripheralStatus, PeripheralError> {
        let status = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(self.retry.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<PeripheralStatus>()
            .await?;
        Ok(status)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_default_backoff_schedule() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.timeout, Duration::from_secs(15));
        let waits: Vec<_> = (0..3).map(|a| retry.backoff(a).as_secs()).collect();
        assert_eq!(waits, [3, 6, 12]);
    }

    #[tokio::test]
    async fn test_status_parses_reply() {
        let url = serve(Router::new().route(
            "/",
            get(|| async {
                Json(serde_json::json!({
                    "status": "Online",
                    "motion": true,
                    "buzzer": true,
                    "pir_connected": true,
                    "motion_count": 4
                }))
            }),
        ))
        .await;

        let status = Esp32Cam::new(&format!("{url}/")).with_retry(fast_retry()).status().await;
        assert_eq!(
            status,
            PeripheralStatus {
                status: "Online".into(),
                motion: true,
                buzzer: true,
                pir_connected: true,
                motion_count: 4,
            }
        );
    }

    #[tokio::test]
    async fn test_status_fills_missing_fields() {
        let url = serve(Router::new().route(
            "/",
            get(|| async { Json(serde_json::json!({ "status": "Online", "motion_count": 2 })) }),
        ))
        .await;

        let status = Esp32Cam::new(&url).with_retry(fast_retry()).status().await;
        assert_eq!(status.status, "Online");
        assert_eq!(status.motion_count, 2);
        assert!(!status.pir_connected);
    }

    #[tokio::test]
    async fn test_status_falls_back_after_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let url = serve(Router::new().route(
            "/",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        ))
        .await;

        let status = Esp32Cam::new(&url).with_retry(fast_retry()).status().await;
        assert_eq!(status, PeripheralStatus::default());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_status_unreachable_host() {
        // Bind then drop a listener to get a port nothing listens on.
        let addr = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let status = Esp32Cam::new(&format!("http://{addr}"))
            .with_retry(fast_retry())
            .status()
            .await;
        assert_eq!(status.status, "Offline");
    }
}
