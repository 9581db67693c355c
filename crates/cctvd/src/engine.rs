use cctv_core::{Analysis, DetectionPipeline, FrameAnnotator};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Analysis of one frame plus the frame with every face drawn on it.
pub struct EngineOutput {
    pub analysis: Analysis,
    pub annotated: RgbImage,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Analyze {
        frame: RgbImage,
        reply: oneshot::Sender<EngineOutput>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect, identify and classify every face in `frame`, then annotate it.
    pub async fn analyze(&self, frame: RgbImage) -> Result<EngineOutput, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns every ONNX session, so model calls are serialized and
/// never block the async runtime. Requests are handled in arrival order.
pub fn spawn_engine(
    mut pipeline: DetectionPipeline,
    annotator: FrameAnnotator,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("cctv-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { frame, reply } => {
                        let analysis = pipeline.analyze(&frame);
                        let annotated = annotator.annotate(&frame, &analysis.results);
                        tracing::debug!(
                            faces = analysis.results.len(),
                            sound_buzzer = analysis.sound_buzzer,
                            "engine: frame analysed"
                        );
                        let _ = reply.send(EngineOutput { analysis, annotated });
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
