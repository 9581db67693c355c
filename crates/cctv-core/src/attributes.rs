//! Mask, age and gender classifiers.
//!
//! All three share one preprocessing contract: crop the face, reject crops
//! under 20×20 pixels without touching the model, resize to the model's
//! input, normalize, and run a single-face batch.

use crate::backend::{InferenceBackend, ModelError, OnnxBackend};
use crate::frame::{self, ChannelOrder};
use crate::types::{Age, FaceRegion, GenderLabel, MaskLabel};
use image::{imageops, RgbImage};
use ndarray::Array4;
use std::path::Path;

/// Smallest crop side, in pixels, the classifiers will look at.
pub const MIN_FACE_SIDE: u32 = 20;

const MASK_INPUT_SIZE: u32 = 224;
const AGE_GENDER_INPUT_SIZE: u32 = 160;
const MASK_THRESHOLD: f32 = 0.5;
/// Gender decision boundary; deliberately not 0.5.
const GENDER_THRESHOLD: f32 = 0.6;
const MAX_AGE: i64 = 120;

/// Crop `region` out of `frame`, or `None` if the crop is below the minimum size.
fn usable_crop(frame: &RgbImage, region: &FaceRegion) -> Option<RgbImage> {
    frame::crop(frame, region).filter(|c| c.width() >= MIN_FACE_SIDE && c.height() >= MIN_FACE_SIDE)
}

fn resize_square(face: &RgbImage, size: u32) -> RgbImage {
    imageops::resize(face, size, size, imageops::FilterType::Triangle)
}

/// Run one single-face tensor and return the first output scalar.
fn score(backend: &mut dyn InferenceBackend, input: Array4<f32>) -> Result<f32, ModelError> {
    backend.run(input.view())?.first()
}

/// Binary mask classifier (MobileNetV2, BGR input scaled to [-1, 1]).
pub struct MaskClassifier {
    backend: Option<Box<dyn InferenceBackend>>,
}

impl MaskClassifier {
    pub fn load(model_path: &Path) -> Self {
        Self::new(OnnxBackend::load_optional(model_path, "mask_detection"))
    }

    pub fn new(backend: Option<Box<dyn InferenceBackend>>) -> Self {
        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Classify whether the face wears a mask, with the verdict's confidence.
    pub fn classify(&mut self, frame: &RgbImage, region: &FaceRegion) -> (MaskLabel, f32) {
        let Some(backend) = self.backend.as_deref_mut() else {
            return (MaskLabel::NoModel, 0.0);
        };
        let Some(face) = usable_crop(frame, region) else {
            return (MaskLabel::Unknown, 0.0);
        };

        let input = frame::nhwc_tensor(
            &resize_square(&face, MASK_INPUT_SIZE),
            ChannelOrder::Bgr,
            |v| v / 127.5 - 1.0,
        );
        match score(backend, input) {
            Ok(p) => mask_verdict(p),
            Err(e) => {
                tracing::error!(error = %e, "mask classification failed");
                (MaskLabel::Error, 0.0)
            }
        }
    }
}

/// `p` is the probability of *not* wearing a mask.
fn mask_verdict(p: f32) -> (MaskLabel, f32) {
    if p > MASK_THRESHOLD {
        (MaskLabel::Tidak, p)
    } else {
        (MaskLabel::Pakai, 1.0 - p)
    }
}

/// Age regressor (RGB input scaled to [0, 1]).
pub struct AgeEstimator {
    backend: Option<Box<dyn InferenceBackend>>,
}

impl AgeEstimator {
    pub fn load(model_path: &Path) -> Self {
        Self::new(OnnxBackend::load_optional(model_path, "age_prediction"))
    }

    pub fn new(backend: Option<Box<dyn InferenceBackend>>) -> Self {
        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn estimate(&mut self, frame: &RgbImage, region: &FaceRegion) -> Age {
        let Some(backend) = self.backend.as_deref_mut() else {
            return Age::Unknown;
        };
        let Some(face) = usable_crop(frame, region) else {
            return Age::Unknown;
        };

        let input = frame::nhwc_tensor(
            &resize_square(&face, AGE_GENDER_INPUT_SIZE),
            ChannelOrder::Rgb,
            |v| v / 255.0,
        );
        match score(backend, input) {
            Ok(raw) => age_verdict(raw),
            Err(e) => {
                tracing::error!(error = %e, "age estimation failed");
                Age::Unknown
            }
        }
    }
}

fn age_verdict(raw: f32) -> Age {
    let years = raw.round() as i64;
    if !raw.is_finite() || !(0..=MAX_AGE).contains(&years) {
        tracing::warn!(prediction = raw, "invalid age prediction");
        return Age::Unknown;
    }
    Age::Years(years as u8)
}

/// Binary gender classifier (RGB input scaled to [0, 1]).
pub struct GenderClassifier {
    backend: Option<Box<dyn InferenceBackend>>,
}

impl GenderClassifier {
    pub fn load(model_path: &Path) -> Self {
        Self::new(OnnxBackend::load_optional(model_path, "gender_prediction"))
    }

    pub fn new(backend: Option<Box<dyn InferenceBackend>>) -> Self {
        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn classify(&mut self, frame: &RgbImage, region: &FaceRegion) -> (GenderLabel, f32) {
        let Some(backend) = self.backend.as_deref_mut() else {
            return (GenderLabel::NoModel, 0.0);
        };
        let Some(face) = usable_crop(frame, region) else {
            return (GenderLabel::Unknown, 0.0);
        };

        let input = frame::nhwc_tensor(
            &resize_square(&face, AGE_GENDER_INPUT_SIZE),
            ChannelOrder::Rgb,
            |v| v / 255.0,
        );
        match score(backend, input) {
            Ok(p) => gender_verdict(p),
            Err(e) => {
                tracing::error!(error = %e, "gender classification failed");
                (GenderLabel::Error, 0.0)
            }
        }
    }
}

fn gender_verdict(p: f32) -> (GenderLabel, f32) {
    if p < GENDER_THRESHOLD {
        (GenderLabel::Pria, 1.0 - p)
    } else {
        (GenderLabel::Wanita, p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{FailingBackend, FixedBackend};
    use image::Rgb;
    use std::sync::atomic::Ordering;

    fn frame() -> RgbImage {
        RgbImage::from_pixel(300, 300, Rgb([120, 110, 100]))
    }

    const FACE: FaceRegion = FaceRegion { top: 10, right: 110, bottom: 130, left: 10 };
    const TINY: FaceRegion = FaceRegion { top: 10, right: 29, bottom: 100, left: 10 };

    #[test]
    fn test_small_crops_never_reach_the_models() {
        let (mask_backend, mask_calls) = FixedBackend::scalar(0.9);
        let (age_backend, age_calls) = FixedBackend::scalar(30.0);
        let (gender_backend, gender_calls) = FixedBackend::scalar(0.9);

        let mut mask = MaskClassifier::new(Some(Box::new(mask_backend)));
        let mut age = AgeEstimator::new(Some(Box::new(age_backend)));
        let mut gender = GenderClassifier::new(Some(Box::new(gender_backend)));

        assert_eq!(mask.classify(&frame(), &TINY), (MaskLabel::Unknown, 0.0));
        assert_eq!(age.estimate(&frame(), &TINY), Age::Unknown);
        assert_eq!(gender.classify(&frame(), &TINY), (GenderLabel::Unknown, 0.0));

        assert_eq!(mask_calls.load(Ordering::SeqCst), 0);
        assert_eq!(age_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gender_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mask_verdicts() {
        let (label, conf) = mask_verdict(0.8);
        assert_eq!(label, MaskLabel::Tidak);
        assert!((conf - 0.8).abs() < 1e-6);

        let (label, conf) = mask_verdict(0.5);
        assert_eq!(label, MaskLabel::Pakai);
        assert!((conf - 0.5).abs() < 1e-6);

        let (label, conf) = mask_verdict(0.1);
        assert_eq!(label, MaskLabel::Pakai);
        assert!((conf - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_mask_input_tensor() {
        let (backend, calls) = FixedBackend::scalar(0.2);
        let mut mask = MaskClassifier::new(Some(Box::new(backend)));
        let (label, _) = mask.classify(&frame(), &FACE);
        assert_eq!(label, MaskLabel::Pakai);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gender_boundary_is_point_six() {
        let (label, conf) = gender_verdict(0.59);
        assert_eq!(label, GenderLabel::Pria);
        assert!((conf - 0.41).abs() < 1e-6);

        let (label, conf) = gender_verdict(0.61);
        assert_eq!(label, GenderLabel::Wanita);
        assert!((conf - 0.61).abs() < 1e-6);

        let (label, _) = gender_verdict(0.55);
        assert_eq!(label, GenderLabel::Pria);
    }

    #[test]
    fn test_gender_through_model() {
        let (backend, _) = FixedBackend::scalar(0.59);
        let mut gender = GenderClassifier::new(Some(Box::new(backend)));
        let (label, conf) = gender.classify(&frame(), &FACE);
        assert_eq!(label, GenderLabel::Pria);
        assert!((conf - 0.41).abs() < 1e-6);
    }

    #[test]
    fn test_age_rounding_and_range() {
        assert_eq!(age_verdict(29.5), Age::Years(30));
        assert_eq!(age_verdict(0.2), Age::Years(0));
        assert_eq!(age_verdict(120.4), Age::Years(120));
        assert_eq!(age_verdict(120.6), Age::Unknown);
        assert_eq!(age_verdict(-0.6), Age::Unknown);
        assert_eq!(age_verdict(f32::NAN), Age::Unknown);
    }

    #[test]
    fn test_missing_models_report_placeholders() {
        let mut mask = MaskClassifier::new(None);
        let mut age = AgeEstimator::new(None);
        let mut gender = GenderClassifier::new(None);
        assert!(!mask.is_available() && !age.is_available() && !gender.is_available());

        assert_eq!(mask.classify(&frame(), &FACE), (MaskLabel::NoModel, 0.0));
        assert_eq!(age.estimate(&frame(), &FACE), Age::Unknown);
        assert_eq!(gender.classify(&frame(), &FACE), (GenderLabel::NoModel, 0.0));
    }

    #[test]
    fn test_runtime_failures_report_error() {
        let mut mask = MaskClassifier::new(Some(Box::new(FailingBackend)));
        let mut age = AgeEstimator::new(Some(Box::new(FailingBackend)));
        let mut gender = GenderClassifier::new(Some(Box::new(FailingBackend)));

        assert_eq!(mask.classify(&frame(), &FACE), (MaskLabel::Error, 0.0));
        assert_eq!(age.estimate(&frame(), &FACE), Age::Unknown);
        assert_eq!(gender.classify(&frame(), &FACE), (GenderLabel::Error, 0.0));
    }
}
