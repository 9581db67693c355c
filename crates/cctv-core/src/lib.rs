//! cctv-core — face analysis engine for the CCTV backend.
//!
//! YOLOv8-face detection, Facenet512 recognition against a known gallery,
//! and mask/age/gender classification, all running via ONNX Runtime. Also
//! owns the bounded detection history and the output-directory sweeper.

pub mod annotate;
pub mod attributes;
pub mod backend;
pub mod detector;
pub mod frame;
pub mod history;
pub mod pipeline;
pub mod recognizer;
pub mod retention;
pub mod types;

pub use annotate::FrameAnnotator;
pub use backend::{InferenceBackend, ModelError, ModelOutput, OnnxBackend};
pub use history::HistoryStore;
pub use pipeline::{Analysis, DetectionPipeline, ModelPaths, ModelStatus};
pub use retention::{RetentionSweeper, SweepReport};
pub use types::{Age, DetectionRecord, FaceRegion, FaceResult, GenderLabel, MaskLabel};
