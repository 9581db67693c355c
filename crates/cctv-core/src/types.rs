use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Label given to a face whose best gallery similarity is below the match threshold.
pub const UNKNOWN_LABEL: &str = "Unknown";
/// Label given to a face the recognizer could not process.
pub const ERROR_LABEL: &str = "Error";

/// Pixel box of a face within one frame, as `(top, right, bottom, left)`.
///
/// Serialized as a four-element array in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self { top, right, bottom, left }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// True when the region lies entirely inside a `width × height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left <= self.right && self.top <= self.bottom && self.right <= width && self.bottom <= height
    }
}

impl From<[u32; 4]> for FaceRegion {
    fn from([top, right, bottom, left]: [u32; 4]) -> Self {
        Self { top, right, bottom, left }
    }
}

impl From<FaceRegion> for [u32; 4] {
    fn from(r: FaceRegion) -> Self {
        [r.top, r.right, r.bottom, r.left]
    }
}

/// Mask classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskLabel {
    /// Wearing a mask.
    Pakai,
    /// Not wearing a mask.
    Tidak,
    Unknown,
    Error,
    #[serde(rename = "No model")]
    NoModel,
}

/// Gender classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenderLabel {
    Pria,
    Wanita,
    Unknown,
    Error,
    #[serde(rename = "No model")]
    NoModel,
}

impl MaskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskLabel::Pakai => "Pakai",
            MaskLabel::Tidak => "Tidak",
            MaskLabel::Unknown => "Unknown",
            MaskLabel::Error => "Error",
            MaskLabel::NoModel => "No model",
        }
    }
}

impl GenderLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenderLabel::Pria => "Pria",
            GenderLabel::Wanita => "Wanita",
            GenderLabel::Unknown => "Unknown",
            GenderLabel::Error => "Error",
            GenderLabel::NoModel => "No model",
        }
    }
}

/// Estimated age in years, or unknown when the estimate was unavailable or implausible.
///
/// Serialized as a bare integer, or the string `"Unknown Age"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "AgeRepr", try_from = "AgeRepr")]
pub enum Age {
    Years(u8),
    Unknown,
}

pub const UNKNOWN_AGE: &str = "Unknown Age";

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AgeRepr {
    Years(u8),
    Text(String),
}

impl From<Age> for AgeRepr {
    fn from(age: Age) -> Self {
        match age {
            Age::Years(y) => AgeRepr::Years(y),
            Age::Unknown => AgeRepr::Text(UNKNOWN_AGE.to_string()),
        }
    }
}

impl TryFrom<AgeRepr> for Age {
    type Error = String;

    fn try_from(repr: AgeRepr) -> Result<Self, Self::Error> {
        match repr {
            AgeRepr::Years(y) => Ok(Age::Years(y)),
            AgeRepr::Text(s) if s == UNKNOWN_AGE => Ok(Age::Unknown),
            AgeRepr::Text(s) => Err(format!("invalid age value: {s}")),
        }
    }
}

impl std::fmt::Display for Age {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Age::Years(y) => write!(f, "{y}"),
            Age::Unknown => f.write_str(UNKNOWN_AGE),
        }
    }
}

/// Everything inferred about one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceResult {
    pub name: String,
    pub face_confidence: f32,
    pub mask: MaskLabel,
    pub mask_confidence: f32,
    pub age: Age,
    pub gender: GenderLabel,
    pub gender_confidence: f32,
    pub location: FaceRegion,
}

impl FaceResult {
    /// True when the face was not matched to any gallery identity.
    pub fn is_unknown(&self) -> bool {
        self.name.starts_with(UNKNOWN_LABEL)
    }
}

/// One stored detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(with = "record_timestamp")]
    pub timestamp: NaiveDateTime,
    pub results: Vec<FaceResult>,
    /// URL path of the annotated image, e.g. `/Output/20240101_120000_cam.jpg`.
    pub image_path: String,
}

/// URL prefix under which annotated images are served.
pub const OUTPUT_URL_PREFIX: &str = "/Output/";

impl DetectionRecord {
    /// Name of the backing image file inside the output directory.
    pub fn file_name(&self) -> &str {
        self.image_path
            .strip_prefix(OUTPUT_URL_PREFIX)
            .unwrap_or(&self.image_path)
    }
}

/// `%Y-%m-%d %H:%M:%S` encoding for record timestamps.
pub mod record_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Face embedding vector (512-dimensional for Facenet512).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar; 0.0 if either vector is zero.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_result(name: &str) -> FaceResult {
        FaceResult {
            name: name.to_string(),
            face_confidence: 0.5,
            mask: MaskLabel::NoModel,
            mask_confidence: 0.0,
            age: Age::Years(31),
            gender: GenderLabel::Wanita,
            gender_confidence: 0.75,
            location: FaceRegion::new(10, 80, 90, 20),
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_face_result_wire_format() {
        let json = serde_json::to_value(sample_result("Budi")).unwrap();
        assert_eq!(json["location"], serde_json::json!([10, 80, 90, 20]));
        assert_eq!(json["mask"], "No model");
        assert_eq!(json["age"], 31);
        assert_eq!(json["gender"], "Wanita");
    }

    #[test]
    fn test_unknown_age_serializes_as_text() {
        let json = serde_json::to_value(Age::Unknown).unwrap();
        assert_eq!(json, "Unknown Age");
        let back: Age = serde_json::from_value(json).unwrap();
        assert_eq!(back, Age::Unknown);
        assert!(serde_json::from_str::<Age>("\"forty\"").is_err());
    }

    #[test]
    fn test_is_unknown_prefix() {
        assert!(sample_result("Unknown 2").is_unknown());
        assert!(!sample_result("Budi").is_unknown());
        assert!(!sample_result(ERROR_LABEL).is_unknown());
    }

    #[test]
    fn test_record_timestamp_format_and_file_name() {
        let record = DetectionRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(7, 8, 9)
                .unwrap(),
            results: vec![sample_result("Budi")],
            image_path: "/Output/20240305_070809_cam.jpg".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timestamp"], "2024-03-05 07:08:09");
        assert_eq!(record.file_name(), "20240305_070809_cam.jpg");
    }

    #[test]
    fn test_region_bounds() {
        let r = FaceRegion::new(10, 80, 90, 20);
        assert_eq!(r.width(), 60);
        assert_eq!(r.height(), 80);
        assert!(r.fits_within(80, 90));
        assert!(!r.fits_within(79, 90));
    }
}
