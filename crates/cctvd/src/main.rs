use anyhow::{Context, Result};
use cctv_core::{DetectionPipeline, FrameAnnotator, ModelPaths};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod error;
mod service;
mod state;
mod storage;
mod upload;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    tracing::info!(port = config.port, debug = config.debug, "cctvd starting");

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        tracing::error!(dir = %config.output_dir.display(), error = %e, "failed to create output directory");
    }

    let pipeline = DetectionPipeline::load(&ModelPaths::in_dir(&config.model_dir));
    let models = pipeline.status();
    let annotator = match &config.font_path {
        Some(path) => FrameAnnotator::with_font_file(path),
        None => FrameAnnotator::bundled(),
    };
    let engine = engine::spawn_engine(pipeline, annotator)?;

    let port = config.port;
    let state = state::AppState::new(config, engine, models);

    service::spawn_sweeper(state.clone());

    let notifier = std::sync::Arc::clone(&state.notifier);
    if notifier.is_enabled() {
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_system_status(true).await {
                tracing::warn!(error = %e, "failed to send startup notification");
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, "cctvd ready");

    axum::serve(listener, api::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("cctvd shutting down");
    if state.notifier.is_enabled() {
        if let Err(e) = state.notifier.notify_system_status(false).await {
            tracing::warn!(error = %e, "failed to send shutdown notification");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
