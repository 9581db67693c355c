//! YOLOv8-face detector.
//!
//! Letterboxes the frame to the model's square input, decodes the
//! single-class `[1, C, N]` output head (rows 0..4 = cx, cy, w, h in input
//! pixels; row 4 = face score) and applies NMS. Boxes are mapped back to
//! frame space and emitted as `(top, right, bottom, left)` regions.

use crate::backend::{InferenceBackend, ModelError, ModelOutput, OnnxBackend};
use crate::types::FaceRegion;
use image::RgbImage;
use ndarray::Array4;
use std::path::Path;

// --- Named constants (ultralytics defaults) ---
const YOLO_INPUT_SIZE: usize = 640;
const YOLO_PAD_VALUE: f32 = 114.0;
const YOLO_CONFIDENCE_THRESHOLD: f32 = 0.25;
const YOLO_NMS_THRESHOLD: f32 = 0.7;
/// Row of the output head holding the face-class score.
const FACE_CLASS_ROW: usize = 4;

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Candidate box in frame coordinates before NMS.
#[derive(Debug, Clone)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
}

/// Single-class face detector.
pub struct FaceDetector {
    backend: Option<Box<dyn InferenceBackend>>,
    input_size: usize,
}

impl FaceDetector {
    /// Load the detector model; a load failure yields an unavailable detector.
    pub fn load(model_path: &Path) -> Self {
        Self {
            backend: OnnxBackend::load_optional(model_path, "face_detection"),
            input_size: YOLO_INPUT_SIZE,
        }
    }

    pub fn with_backend(backend: Box<dyn InferenceBackend>) -> Self {
        Self { backend: Some(backend), input_size: YOLO_INPUT_SIZE }
    }

    pub fn unavailable() -> Self {
        Self { backend: None, input_size: YOLO_INPUT_SIZE }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Detect faces, highest confidence first.
    ///
    /// Never fails: an unavailable model or a failed run yields no faces.
    pub fn detect(&mut self, frame: &RgbImage) -> Vec<FaceRegion> {
        match self.try_detect(frame) {
            Ok(regions) => {
                tracing::info!(count = regions.len(), "detected faces");
                regions
            }
            Err(e) => {
                tracing::error!(error = %e, "face detection failed");
                Vec::new()
            }
        }
    }

    fn try_detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceRegion>, ModelError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = self.preprocess(frame);
        let backend = self.backend.as_mut().ok_or(ModelError::Unavailable)?;
        let output = backend.run(input.view())?;

        let candidates = decode_output(&output, &letterbox, YOLO_CONFIDENCE_THRESHOLD)?;
        let kept = nms(candidates, YOLO_NMS_THRESHOLD);

        Ok(kept
            .iter()
            .filter_map(|c| to_region(c, width, height))
            .collect())
    }

    /// Letterbox an RGB frame into a NCHW float tensor scaled to [0, 1].
    fn preprocess(&self, frame: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
        let size = self.input_size;
        let (width, height) = frame.dimensions();
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

        let new_w = ((width as f32 * scale).round() as usize).clamp(1, size);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, size);
        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;

        let resized = image::imageops::resize(
            frame,
            new_w as u32,
            new_h as u32,
            image::imageops::FilterType::Triangle,
        );

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), YOLO_PAD_VALUE / 255.0);
        for (x, y, px) in resized.enumerate_pixels() {
            let ty = y as usize + pad_y_start;
            let tx = x as usize + pad_x_start;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = px[c] as f32 / 255.0;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x: pad_x_start as f32, pad_y: pad_y_start as f32 })
    }
}

/// Decode a `[1, C, N]` head into frame-space candidates above `threshold`.
fn decode_output(
    output: &ModelOutput,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Result<Vec<Candidate>, ModelError> {
    let (channels, anchors) = match output.shape.as_slice() {
        [1, c, n] => (*c, *n),
        [c, n] => (*c, *n),
        other => {
            return Err(ModelError::InferenceFailed(format!(
                "unexpected detector output shape {other:?}"
            )))
        }
    };
    if channels <= FACE_CLASS_ROW || output.data.len() < channels * anchors {
        return Err(ModelError::InferenceFailed(format!(
            "detector output has {channels} channels × {anchors} anchors, need at least {}",
            FACE_CLASS_ROW + 1
        )));
    }

    let at = |row: usize, i: usize| output.data[row * anchors + i];
    let mut candidates = Vec::new();

    for i in 0..anchors {
        let score = at(FACE_CLASS_ROW, i);
        if score <= threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));

        candidates.push(Candidate {
            x1: (cx - w / 2.0 - letterbox.pad_x) / letterbox.scale,
            y1: (cy - h / 2.0 - letterbox.pad_y) / letterbox.scale,
            x2: (cx + w / 2.0 - letterbox.pad_x) / letterbox.scale,
            y2: (cy + h / 2.0 - letterbox.pad_y) / letterbox.scale,
            confidence: score,
        });
    }

    Ok(candidates)
}

/// Clamp a candidate to the frame and truncate to integer pixels.
fn to_region(c: &Candidate, width: u32, height: u32) -> Option<FaceRegion> {
    let clamp_x = |v: f32| v.clamp(0.0, width as f32) as u32;
    let clamp_y = |v: f32| v.clamp(0.0, height as f32) as u32;
    let region = FaceRegion::new(clamp_y(c.y1), clamp_x(c.x2), clamp_y(c.y2), clamp_x(c.x1));
    (region.width() > 0 && region.height() > 0).then_some(region)
}

/// Non-Maximum Suppression: remove overlapping candidates, highest confidence first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(candidates[i].clone());

        for j in (i + 1)..candidates.len() {
            if !suppressed[j] && iou(&candidates[i], &candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two candidates.
fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
