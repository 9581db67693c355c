//! Telegram Bot API client.

use crate::message;
use cctv_core::types::FaceResult;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Whole-request bound, photo upload included.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Telegram credentials not configured")]
    NotConfigured,
    /// Transport failure. The request URL carries the bot token and is stripped.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Telegram rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Request(e.without_url())
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build HTTP client; using defaults");
            reqwest::Client::new()
        })
}

#[derive(Debug, Clone)]
struct Credentials {
    token: String,
    chat_id: String,
}

/// Sends texts and annotated photos to one Telegram chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    credentials: Option<Credentials>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Notifier for the given bot token and chat; disabled unless both are non-empty.
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        let credentials = match (token, chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some(Credentials { token, chat_id })
            }
            _ => None,
        };
        Self {
            credentials,
            api_base: TELEGRAM_API_BASE.to_string(),
            client: http_client(SEND_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Point the client at a different API host.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Send `text`, as a photo caption when `photo` names an existing file.
    pub async fn send(&self, text: &str, photo: Option<&Path>) -> Result<(), NotifyError> {
        let creds = self.credentials.as_ref().ok_or(NotifyError::NotConfigured)?;
        let method_url = |method: &str| format!("{}/bot{}/{method}", self.api_base, creds.token);

        let photo_bytes = match photo {
            Some(path) => tokio::fs::read(path).await.ok().map(|bytes| (path, bytes)),
            None => None,
        };

        let request = match photo_bytes {
            Some((path, bytes)) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "detection.jpg".to_string());
                let form = Form::new()
                    .text("chat_id", creds.chat_id.clone())
                    .text("caption", text.to_string())
                    .text("parse_mode", "HTML")
                    .part("photo", Part::bytes(bytes).file_name(file_name));
                self.client.post(method_url("sendPhoto")).multipart(form)
            }
            None => self.client.post(method_url("sendMessage")).form(&[
                ("chat_id", creds.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
            ]),
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!("Telegram notification sent");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected { status: status.as_u16(), body })
        }
    }

    /// Report the faces of one detection, attaching the annotated image.
    pub async fn notify_faces(&self, faces: &[FaceResult], photo: Option<&Path>) -> Result<(), NotifyError> {
        let text = message::faces_message(faces, chrono::Local::now().naive_local());
        self.send(&text, photo).await
    }

    pub async fn notify_system_status(&self, online: bool) -> Result<(), NotifyError> {
        self.send(message::system_status_message(online), None).await
    }

    pub async fn send_test(&self) -> Result<(), NotifyError> {
        self.send(message::TEST_MESSAGE, None).await
    }
}
