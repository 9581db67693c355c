//! Facenet512 face recognizer and gallery matching.
//!
//! Embeds a face crop and compares it by cosine similarity against a
//! gallery of known identities loaded once at startup.

use crate::backend::{InferenceBackend, ModelError, OnnxBackend};
use crate::frame::{self, ChannelOrder};
use crate::types::{Embedding, FaceRegion, ERROR_LABEL, UNKNOWN_LABEL};
use image::{imageops, RgbImage};
use ndarray::Array4;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const FACENET_INPUT_SIZE: u32 = 160;
/// Minimum cosine similarity for a gallery match.
pub const MATCH_THRESHOLD: f32 = 0.85;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid gallery file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("gallery has {labels} labels but {embeddings} embeddings")]
    LengthMismatch { labels: usize, embeddings: usize },
    #[error("gallery embedding {index} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// On-disk gallery format: parallel `labels` and `embeddings` arrays.
#[derive(Deserialize)]
struct GalleryFile {
    labels: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

/// Known identities: embeddings paired with labels. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    labels: Vec<String>,
    embeddings: Vec<Embedding>,
}

impl Gallery {
    /// Build a gallery from parallel arrays, rejecting mismatched lengths or dimensions.
    pub fn new(labels: Vec<String>, embeddings: Vec<Vec<f32>>) -> Result<Self, GalleryError> {
        if labels.len() != embeddings.len() {
            return Err(GalleryError::LengthMismatch {
                labels: labels.len(),
                embeddings: embeddings.len(),
            });
        }
        if let Some(expected) = embeddings.first().map(Vec::len) {
            if let Some((index, e)) = embeddings
                .iter()
                .enumerate()
                .find(|(_, e)| e.len() != expected || e.is_empty())
            {
                return Err(GalleryError::DimensionMismatch { index, expected, actual: e.len() });
            }
        }

        Ok(Self {
            labels,
            embeddings: embeddings.into_iter().map(Embedding::new).collect(),
        })
    }

    /// Load a gallery JSON file.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let raw = std::fs::read(path).map_err(|source| GalleryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: GalleryFile = serde_json::from_slice(&raw)?;
        let gallery = Self::new(file.labels, file.embeddings)?;
        tracing::info!(path = %path.display(), identities = gallery.len(), dim = gallery.dim(), "loaded gallery");
        Ok(gallery)
    }

    /// Load a gallery, logging and falling back to an empty one on failure.
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to load gallery; recognition disabled");
            Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Embedding dimension, or 0 for an empty gallery.
    pub fn dim(&self) -> usize {
        self.embeddings.first().map_or(0, Embedding::dim)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best candidate [-1, 1].
    pub similarity: f32,
    /// Label of the matched identity (if any).
    pub label: Option<String>,
}

/// Strategy for comparing a probe embedding against a gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, threshold: f32) -> MatchResult;
}

/// Arg-max cosine similarity over the whole gallery.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, known) in gallery.embeddings().iter().enumerate() {
            let sim = probe.similarity(known);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                label: gallery.label(idx).map(str::to_string),
            },
            _ => MatchResult {
                matched: false,
                similarity: if best_sim == f32::NEG_INFINITY { 0.0 } else { best_sim },
                label: None,
            },
        }
    }
}

/// Facenet512-based recognizer bound to a gallery.
pub struct FaceRecognizer {
    backend: Option<Box<dyn InferenceBackend>>,
    gallery: Gallery,
    threshold: f32,
}

impl FaceRecognizer {
    /// Load the embedding model; a load failure yields an unavailable recognizer.
    pub fn load(model_path: &Path, gallery: Gallery) -> Self {
        Self {
            backend: OnnxBackend::load_optional(model_path, "face_recognition"),
            gallery,
            threshold: MATCH_THRESHOLD,
        }
    }

    pub fn new(backend: Option<Box<dyn InferenceBackend>>, gallery: Gallery) -> Self {
        Self { backend, gallery, threshold: MATCH_THRESHOLD }
    }

    /// True when both the embedding model and a non-empty gallery are present.
    pub fn is_available(&self) -> bool {
        self.backend.is_some() && !self.gallery.is_empty()
    }

    /// Identify the face in `region`, returning `(label, confidence)`.
    ///
    /// Confidence is the best gallery similarity clamped to [0, 1]. Faces below
    /// the match threshold are labelled `Unknown`; failures yield `("Error", 0.0)`.
    pub fn recognize(&mut self, frame: &RgbImage, region: &FaceRegion) -> (String, f32) {
        if !self.is_available() {
            tracing::error!("recognition model or gallery not loaded");
            return (ERROR_LABEL.to_string(), 0.0);
        }

        let Some(face) = frame::crop(frame, region) else {
            tracing::warn!(?region, "empty face crop");
            return (UNKNOWN_LABEL.to_string(), 0.0);
        };

        let embedding = match self.embed(&face) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "face embedding failed");
                return (ERROR_LABEL.to_string(), 0.0);
            }
        };

        let result = CosineMatcher.compare(&embedding, &self.gallery, self.threshold);
        let confidence = result.similarity.clamp(0.0, 1.0);
        let label = result.label.unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        tracing::info!(%label, similarity = confidence, "recognized face");
        (label, confidence)
    }

    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, ModelError> {
        let input = Self::preprocess(face);
        let backend = self.backend.as_mut().ok_or(ModelError::Unavailable)?;
        let output = backend.run(input.view())?;

        let expected = self.gallery.dim();
        if output.data.len() != expected {
            return Err(ModelError::InferenceFailed(format!(
                "expected {expected}-dim embedding, got {}",
                output.data.len()
            )));
        }
        Ok(Embedding::new(output.data))
    }

    /// Fit the crop inside 160×160 (aspect preserved, black border) and scale to [0, 1].
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE;
        let (w, h) = face.dimensions();
        let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
        let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);

        let resized = imageops::resize(face, new_w, new_h, imageops::FilterType::Triangle);
        let mut canvas = RgbImage::new(size, size);
        imageops::replace(
            &mut canvas,
            &resized,
            ((size - new_w) / 2) as i64,
            ((size - new_h) / 2) as i64,
        );

        frame::nhwc_tensor(&canvas, ChannelOrder::Rgb, |v| v / 255.0)
    }
}
