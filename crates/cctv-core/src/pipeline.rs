//! Per-frame analysis: detect, then identify and classify every face.

use crate::attributes::{AgeEstimator, GenderClassifier, MaskClassifier};
use crate::detector::FaceDetector;
use crate::recognizer::{FaceRecognizer, Gallery};
use crate::types::{FaceResult, UNKNOWN_LABEL};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Unknown faces scoring below this similarity raise the alert.
pub const ALERT_CONFIDENCE: f32 = 0.90;

/// Model artifacts inside the model directory.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub embedder: PathBuf,
    pub gallery: PathBuf,
    pub mask: PathBuf,
    pub age: PathBuf,
    pub gender: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join("yolov8n-face.onnx"),
            embedder: dir.join("facenet512.onnx"),
            gallery: dir.join("gallery.json"),
            mask: dir.join("mask_model.onnx"),
            age: dir.join("age_model.onnx"),
            gender: dir.join("gender_model.onnx"),
        }
    }
}

/// Which models loaded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub face_detection: bool,
    pub face_recognition: bool,
    pub mask_detection: bool,
    pub age_prediction: bool,
    pub gender_prediction: bool,
}

/// Outcome of analysing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// One entry per detected face, in detector order.
    pub results: Vec<FaceResult>,
    pub sound_buzzer: bool,
}

/// Detector, recognizer and attribute classifiers, run in sequence per face.
pub struct DetectionPipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    mask: MaskClassifier,
    age: AgeEstimator,
    gender: GenderClassifier,
}

impl DetectionPipeline {
    pub fn new(
        detector: FaceDetector,
        recognizer: FaceRecognizer,
        mask: MaskClassifier,
        age: AgeEstimator,
        gender: GenderClassifier,
    ) -> Self {
        Self { detector, recognizer, mask, age, gender }
    }

    /// Load every model; missing or broken models leave their component unavailable.
    pub fn load(paths: &ModelPaths) -> Self {
        let gallery = Gallery::load_or_empty(&paths.gallery);
        let pipeline = Self::new(
            FaceDetector::load(&paths.detector),
            FaceRecognizer::load(&paths.embedder, gallery),
            MaskClassifier::load(&paths.mask),
            AgeEstimator::load(&paths.age),
            GenderClassifier::load(&paths.gender),
        );
        tracing::info!(status = ?pipeline.status(), "detection pipeline ready");
        pipeline
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            face_detection: self.detector.is_available(),
            face_recognition: self.recognizer.is_available(),
            mask_detection: self.mask.is_available(),
            age_prediction: self.age.is_available(),
            gender_prediction: self.gender.is_available(),
        }
    }

    /// Analyse one frame.
    ///
    /// Unknown faces are numbered `Unknown 1`, `Unknown 2`, ... in detector
    /// order. The alert fires when any unknown face scores below
    /// [`ALERT_CONFIDENCE`].
    pub fn analyze(&mut self, frame: &RgbImage) -> Analysis {
        let regions = self.detector.detect(frame);
        let mut results = Vec::with_capacity(regions.len());
        let mut unknown_count = 0usize;
        let mut sound_buzzer = false;

        for region in regions {
            let (mut name, face_confidence) = self.recognizer.recognize(frame, &region);
            if name == UNKNOWN_LABEL {
                unknown_count += 1;
                name = format!("{UNKNOWN_LABEL} {unknown_count}");
            }
            let (mask, mask_confidence) = self.mask.classify(frame, &region);
            let age = self.age.estimate(frame, &region);
            let (gender, gender_confidence) = self.gender.classify(frame, &region);

            let face = FaceResult {
                name,
                face_confidence,
                mask,
                mask_confidence,
                age,
                gender,
                gender_confidence,
                location: region,
            };
            if face.is_unknown() && face.face_confidence < ALERT_CONFIDENCE {
                sound_buzzer = true;
            }
            results.push(face);
        }

        Analysis { results, sound_buzzer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{FixedBackend, SequenceBackend};
    use crate::types::{Age, FaceRegion, GenderLabel, MaskLabel};
    use image::Rgb;

    /// Build a `[1, 5, N]` detector head from `(x1, y1, x2, y2, score)` boxes on a 640×640 frame.
    fn detector_head(boxes: &[(f32, f32, f32, f32, f32)]) -> FixedBackend {
        let n = boxes.len();
        let mut data = vec![0.0; 5 * n];
        for (i, &(x1, y1, x2, y2, s)) in boxes.iter().enumerate() {
            data[i] = (x1 + x2) / 2.0;
            data[n + i] = (y1 + y2) / 2.0;
            data[2 * n + i] = x2 - x1;
            data[3 * n + i] = y2 - y1;
            data[4 * n + i] = s;
        }
        FixedBackend::new(vec![1, 5, n], data).0
    }

    /// Pipeline whose detector returns `boxes` and whose embedder returns `embeddings` in order.
    fn fake_pipeline(
        boxes: &[(f32, f32, f32, f32, f32)],
        embeddings: Vec<Vec<f32>>,
    ) -> DetectionPipeline {
        let gallery = Gallery::new(
            vec!["Andi".into(), "Sari".into()],
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
        )
        .unwrap();
        DetectionPipeline::new(
            FaceDetector::with_backend(Box::new(detector_head(boxes))),
            FaceRecognizer::new(Some(Box::new(SequenceBackend::embeddings(embeddings))), gallery),
            MaskClassifier::new(Some(Box::new(FixedBackend::scalar(0.2).0))),
            AgeEstimator::new(Some(Box::new(SequenceBackend::scalars(vec![25.4, 61.0, 7.8, 40.0])))),
            GenderClassifier::new(Some(Box::new(FixedBackend::scalar(0.7).0))),
        )
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(640, 640, Rgb([100, 100, 100]))
    }

    #[test]
    fn test_unknown_faces_numbered_in_detector_order() {
        let boxes = [
            (10.0, 10.0, 110.0, 110.0, 0.95),
            (200.0, 10.0, 300.0, 110.0, 0.90),
            (400.0, 10.0, 500.0, 110.0, 0.85),
        ];
        // All three are far from both gallery entries.
        let strangers = vec![vec![0.0, 0.0, 1.0]; 3];
        let mut pipeline = fake_pipeline(&boxes, strangers);

        let analysis = pipeline.analyze(&frame());
        let names: Vec<_> = analysis.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Unknown 1", "Unknown 2", "Unknown 3"]);
        assert!(analysis.sound_buzzer);
        assert_eq!(analysis.results[0].location.left, 10);
        assert_eq!(analysis.results[2].location.left, 400);
    }

    #[test]
    fn test_known_faces_do_not_alert() {
        let boxes = [(10.0, 10.0, 110.0, 110.0, 0.95), (300.0, 300.0, 400.0, 400.0, 0.9)];
        let mut pipeline = fake_pipeline(&boxes, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.05]]);

        let analysis = pipeline.analyze(&frame());
        assert_eq!(analysis.results.len(), 2);
        assert_eq!(analysis.results[0].name, "Andi");
        assert_eq!(analysis.results[1].name, "Sari");
        assert!(!analysis.sound_buzzer);

        let first = &analysis.results[0];
        assert_eq!(first.mask, MaskLabel::Pakai);
        assert!((first.mask_confidence - 0.8).abs() < 1e-6);
        assert_eq!(first.age, Age::Years(25));
        assert_eq!(first.gender, GenderLabel::Wanita);
        assert_eq!(analysis.results[1].age, Age::Years(61));
    }

    #[test]
    fn test_unknown_counter_skips_known_faces() {
        let boxes = [
            (10.0, 10.0, 110.0, 110.0, 0.95),
            (200.0, 10.0, 300.0, 110.0, 0.90),
            (400.0, 10.0, 500.0, 110.0, 0.85),
        ];
        let mut pipeline = fake_pipeline(
            &boxes,
            vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]],
        );
        let names: Vec<_> = pipeline
            .analyze(&frame())
            .results
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["Unknown 1", "Andi", "Unknown 2"]);
    }

    #[test]
    fn test_results_lie_within_frame() {
        let boxes = [(-30.0, -30.0, 100.0, 100.0, 0.9), (600.0, 600.0, 700.0, 700.0, 0.8)];
        let mut pipeline = fake_pipeline(&boxes, vec![vec![1.0, 0.0, 0.0]; 2]);
        let analysis = pipeline.analyze(&frame());
        assert_eq!(analysis.results.len(), 2);
        assert!(analysis.results.iter().all(|r| r.location.fits_within(640, 640)));
        assert_eq!(analysis.results[0].location, FaceRegion::new(0, 100, 100, 0));
    }

    #[test]
    fn test_no_faces() {
        let mut pipeline = fake_pipeline(&[], vec![]);
        let analysis = pipeline.analyze(&frame());
        assert!(analysis.results.is_empty());
        assert!(!analysis.sound_buzzer);
    }

    #[test]
    fn test_status_reports_missing_models() {
        let pipeline = DetectionPipeline::load(&ModelPaths::in_dir(Path::new("/nonexistent")));
        assert_eq!(
            pipeline.status(),
            ModelStatus {
                face_detection: false,
                face_recognition: false,
                mask_detection: false,
                age_prediction: false,
                gender_prediction: false,
            }
        );
    }
}
