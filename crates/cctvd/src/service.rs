//! Detection flow behind `/api/process_image`, and the retention sweeps.

use crate::engine::EngineOutput;
use crate::error::ApiError;
use crate::state::AppState;
use crate::{storage, upload};
use anyhow::Context;
use axum::body::Bytes;
use cctv_core::frame::{self, MAX_FRAME_HEIGHT, MAX_FRAME_WIDTH};
use cctv_core::types::OUTPUT_URL_PREFIX;
use cctv_core::{DetectionRecord, FaceResult, SweepReport};
use chrono::{Local, Timelike};
use image::RgbImage;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// The `image` field of an upload, already validated by name.
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    /// ISO-8601 local time at which the response was built.
    pub timestamp: String,
    pub faces_detected: usize,
    pub results: Vec<FaceResult>,
    pub sound_buzzer: bool,
    /// Seconds from request start to response.
    pub processing_time: f64,
    pub image_path: String,
}

/// Decode, analyse, annotate and store one uploaded frame.
///
/// Frames with faces raise a notification and enter the history; the
/// annotated image is written either way and the output directory is swept
/// afterwards.
pub async fn process_upload(
    state: &AppState,
    file: Upload,
    started: Instant,
) -> Result<ProcessResponse, ApiError> {
    let Upload { file_name, bytes } = file;

    let frame = tokio::task::spawn_blocking(move || {
        frame::decode(&bytes).map(|f| frame::fit_within(f, MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT))
    })
    .await
    .context("decode task failed")?
    .map_err(ApiError::Decode)?;

    let EngineOutput { analysis, annotated } = state
        .engine
        .analyze(frame)
        .await
        .context("inference engine unavailable")?;

    let results = analysis.results;
    let stored = store_detection(state, annotated, &file_name, results.clone()).await?;
    tracing::info!(path = %stored.path.display(), "saved annotated image");

    if !results.is_empty() {
        notify_faces(state, results.clone(), stored.path.clone());
    }

    tracing::info!(
        faces = results.len(),
        buzzer = analysis.sound_buzzer,
        "processed image"
    );

    Ok(ProcessResponse {
        timestamp: Local::now()
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string(),
        faces_detected: results.len(),
        results,
        sound_buzzer: analysis.sound_buzzer,
        processing_time: started.elapsed().as_secs_f64(),
        image_path: stored.image_path,
    })
}

/// Send the detection notification in the background; failures are logged.
fn notify_faces(state: &AppState, faces: Vec<FaceResult>, photo: PathBuf) {
    let notifier = Arc::clone(&state.notifier);
    if !notifier.is_enabled() {
        tracing::debug!("notifications disabled; skipping detection alert");
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_faces(&faces, Some(&photo)).await {
            tracing::error!(error = %e, "error sending Telegram notification");
        }
    });
}

/// Where an annotated frame was written.
struct StoredImage {
    path: PathBuf,
    /// URL path under which the file is served.
    image_path: String,
}

/// Write the annotated frame, record it if it has faces, then sweep.
///
/// All three steps run under the history lock, so no sweep can see the new
/// file before its record exists.
async fn store_detection(
    state: &AppState,
    annotated: RgbImage,
    upload_name: &str,
    results: Vec<FaceResult>,
) -> anyhow::Result<StoredImage> {
    let history = Arc::clone(&state.history);
    let sweeper = Arc::clone(&state.sweeper);
    let output_dir = state.config.output_dir.clone();
    let sanitized = upload::sanitize_filename(upload_name);

    tokio::task::spawn_blocking(move || -> anyhow::Result<StoredImage> {
        let mut history = history.blocking_lock();

        let now = Local::now().naive_local();
        let (stored_name, file) = storage::create_detection_file(&output_dir, now, &sanitized)
            .with_context(|| format!("failed to create image file in {}", output_dir.display()))?;
        let path = output_dir.join(&stored_name);
        storage::write_jpeg(&annotated, file)
            .with_context(|| format!("failed to write {}", path.display()))?;
        let image_path = format!("{OUTPUT_URL_PREFIX}{stored_name}");

        if !results.is_empty() {
            history.append(DetectionRecord {
                timestamp: now.with_nanosecond(0).unwrap_or(now),
                results,
                image_path: image_path.clone(),
            });
        }
        sweeper.sweep(&mut history);

        Ok(StoredImage { path, image_path })
    })
    .await
    .context("history update failed")?
}

/// Sweep the output directory against the current history.
pub async fn run_sweep(state: &AppState) -> anyhow::Result<Option<SweepReport>> {
    let history = Arc::clone(&state.history);
    let sweeper = Arc::clone(&state.sweeper);
    tokio::task::spawn_blocking(move || sweeper.sweep(&mut history.blocking_lock()))
        .await
        .context("sweep task failed")
}

/// Sweep once immediately, then every `config.sweep_interval`.
pub fn spawn_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.sweep_interval);
        tracing::info!(period_secs = state.config.sweep_interval.as_secs(), "started image cleanup scheduler");
        loop {
            ticker.tick().await;
            if let Err(e) = run_sweep(&state).await {
                tracing::error!(error = ?e, "error in cleanup scheduler");
            }
        }
    })
}
