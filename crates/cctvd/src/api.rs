//! HTTP surface: JSON API under `/api`, annotated images under `/Output`,
//! everything else from the web directory.

use crate::error::ApiError;
use crate::service::{self, ProcessResponse, Upload};
use crate::state::AppState;
use crate::{storage, upload};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use cctv_core::{DetectionRecord, ModelStatus};
use cctv_hw::PeripheralStatus;
use cctv_notify::NotifyError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

const DEFAULT_HISTORY_LIMIT: usize = 10;
const TEST_BUZZER_DURATION: Duration = Duration::from_secs(3);

pub fn router(state: AppState) -> Router {
    let output_dir = state.config.output_dir.clone();
    let web_dir = state.config.web_dir.clone();

    let api = Router::new()
        .route("/status", get(status))
        .route("/process_image", post(process_image))
        .route("/history", get(history))
        .route("/test_telegram", get(test_telegram))
        .route("/test_buzzer", get(test_buzzer))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .nest_service("/Output", ServeDir::new(output_dir))
        .fallback_service(ServeDir::new(web_dir))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    models_loaded: ModelStatus,
    telegram_enabled: bool,
    esp32_status: PeripheralStatus,
    detection_count: usize,
    image_count: usize,
    total_image_size_mb: f64,
    #[serde(rename = "LAST_DETECTION")]
    last_detection: Option<DetectionRecord>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let usage = storage::output_usage(&state.config.output_dir)
        .await
        .map_err(ApiError::Status)?;
    let esp32_status = state.camera.status().await;
    let (detection_count, last_detection) = {
        let history = state.history.lock().await;
        (history.len(), history.latest().map(|r| (*r).clone()))
    };

    Ok(Json(StatusResponse {
        status: "Online",
        version: env!("CARGO_PKG_VERSION"),
        models_loaded: state.models,
        telegram_enabled: state.notifier.is_enabled(),
        esp32_status,
        detection_count,
        image_count: usage.image_count,
        total_image_size_mb: usage.total_mb(),
        last_detection,
    }))
}

async fn process_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let started = Instant::now();
    let mut multipart = multipart?;
    let file = read_image_field(&mut multipart).await?;
    let response = service::process_upload(&state, file, started).await?;
    Ok(Json(response))
}

/// Pull the `image` file field out of the form and check its name.
async fn read_image_field(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if file_name.is_empty() {
            return Err(ApiError::NoSelectedFile);
        }
        if !upload::allowed_file(&file_name) {
            return Err(ApiError::InvalidFileFormat);
        }
        let bytes = field.bytes().await?;
        return Ok(Upload { file_name, bytes });
    }
    Err(ApiError::NoImagePart)
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<String>,
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<DetectionRecord>> {
    let limit = query
        .limit
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    let records = state.history.lock().await.list(limit);
    tracing::info!(count = records.len(), "returning history entries");
    Json(records)
}

/// `{"status": "success"|"error", "message": ...}` reply of the test endpoints.
#[derive(Serialize)]
struct ActionReply {
    status: &'static str,
    message: String,
}

impl ActionReply {
    fn success(message: &str) -> (StatusCode, Json<Self>) {
        (StatusCode::OK, Json(Self { status: "success", message: message.to_string() }))
    }

    fn error(message: impl ToString) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self { status: "error", message: message.to_string() }),
        )
    }
}

async fn test_telegram(State(state): State<AppState>) -> (StatusCode, Json<ActionReply>) {
    match state.notifier.send_test().await {
        Ok(()) => ActionReply::success("Tes Notifikasi Telegram Berhasil"),
        Err(e) => {
            tracing::error!(error = ?e, "error sending test Telegram notification");
            match e {
                NotifyError::NotConfigured => ActionReply::error(e),
                _ => ActionReply::error("Failed to send Telegram notification"),
            }
        }
    }
}

async fn test_buzzer(State(state): State<AppState>) -> (StatusCode, Json<ActionReply>) {
    match state.camera.sound_buzzer(TEST_BUZZER_DURATION).await {
        Ok(()) => ActionReply::success("Buzzer Berhasil dinyalakan elama 3 detik"),
        Err(e) => {
            tracing::error!(error = %e, "error testing buzzer");
            ActionReply::error(e)
        }
    }
}
