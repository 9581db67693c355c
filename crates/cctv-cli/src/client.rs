//! Thin HTTP client for a running cctvd.

use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;

pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn status(&self) -> Result<Value> {
        self.get("/api/status").await
    }

    pub async fn history(&self, limit: usize) -> Result<Value> {
        self.get(&format!("/api/history?limit={limit}")).await
    }

    pub async fn test_telegram(&self) -> Result<Value> {
        self.get("/api/test_telegram").await
    }

    pub async fn test_buzzer(&self) -> Result<Value> {
        self.get("/api/test_buzzer").await
    }

    /// Upload an image file for detection.
    pub async fn process(&self, path: &Path) -> Result<Value> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let form = Form::new().part("image", Part::bytes(bytes).file_name(file_name));

        let url = format!("{}/api/process_image", self.base_url);
        tracing::debug!(%url, "uploading image");
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("cannot reach cctvd at {}", self.base_url))?;
        Self::decode(response).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("cannot reach cctvd at {}", self.base_url))?;
        Self::decode(response).await
    }

    /// Parse the JSON body; non-success statuses become errors carrying the
    /// daemon's message.
    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response.json().await.context("daemon sent a non-JSON reply")?;
        if !status.is_success() {
            let message = body
                .get("error")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("cctvd returned {status}: {message}");
        }
        Ok(body)
    }
}
