//! Annotated image files in the output directory.

use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, RgbImage};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;

pub const JPEG_QUALITY: u8 = 85;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Create a new, empty file for an upload received at `now`.
///
/// The name is `<YYYYMMDD_HHMMSS>_<sanitized>`, or
/// `<YYYYMMDD_HHMMSS>_<n>_<sanitized>` when that is already taken. Existing
/// files are never opened.
pub fn create_detection_file(
    dir: &Path,
    now: NaiveDateTime,
    sanitized: &str,
) -> io::Result<(String, File)> {
    let stamp = now.format("%Y%m%d_%H%M%S");
    for n in 0..MAX_NAME_ATTEMPTS {
        let name = if n == 0 {
            format!("{stamp}_{sanitized}")
        } else {
            format!("{stamp}_{n}_{sanitized}")
        };
        match OpenOptions::new().write(true).create_new(true).open(dir.join(&name)) {
            Ok(file) => return Ok((name, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free file name for {stamp}_{sanitized}"),
    ))
}

/// Write `img` into `file` as a JPEG at [`JPEG_QUALITY`].
pub fn write_jpeg(img: &RgbImage, file: File) -> ImageResult<()> {
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(img)?;
    writer.flush()?;
    Ok(())
}

/// Number and total size of the files in the output directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputUsage {
    pub image_count: usize,
    pub total_bytes: u64,
}

impl OutputUsage {
    /// Total size in MiB, rounded to two decimals.
    pub fn total_mb(&self) -> f64 {
        (self.total_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
    }
}

pub async fn output_usage(dir: &Path) -> std::io::Result<OutputUsage> {
    let mut usage = OutputUsage::default();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_file() {
            usage.image_count += 1;
            usage.total_bytes += meta.len();
        }
    }
    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_year_eve() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 5, 9)
            .unwrap()
    }

    #[test]
    fn test_detection_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let (name, _) = create_detection_file(dir.path(), new_year_eve(), "cam.jpg").unwrap();
        assert_eq!(name, "20241231_230509_cam.jpg");
        assert!(dir.path().join(&name).is_file());
    }

    #[test]
    fn test_same_second_uploads_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20241231_230509_cam.jpg"), b"first").unwrap();

        let (second, _) = create_detection_file(dir.path(), new_year_eve(), "cam.jpg").unwrap();
        let (third, _) = create_detection_file(dir.path(), new_year_eve(), "cam.jpg").unwrap();
        assert_eq!(second, "20241231_230509_1_cam.jpg");
        assert_eq!(third, "20241231_230509_2_cam.jpg");
        assert_eq!(std::fs::read(dir.path().join("20241231_230509_cam.jpg")).unwrap(), b"first");
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let err = create_detection_file(Path::new("/nonexistent/cctv-output"), new_year_eve(), "a.jpg")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_write_jpeg_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let (name, file) = create_detection_file(dir.path(), new_year_eve(), "out.jpg").unwrap();
        let path = dir.path().join(name);
        write_jpeg(&RgbImage::from_pixel(40, 30, image::Rgb([200, 10, 10])), file).unwrap();

        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (40, 30));
        assert_eq!(image::ImageFormat::from_path(&path).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn test_total_mb_rounding() {
        let usage = OutputUsage { image_count: 2, total_bytes: 1_572_864 + 4_000 };
        assert_eq!(usage.total_mb(), 1.5);
    }

    #[tokio::test]
    async fn test_output_usage_counts_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), [0u8; 100]).unwrap();
        std::fs::write(dir.path().join("b.jpg"), [0u8; 50]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let usage = output_usage(dir.path()).await.unwrap();
        assert_eq!(usage, OutputUsage { image_count: 2, total_bytes: 150 });
    }

    #[tokio::test]
    async fn test_output_usage_missing_dir() {
        assert!(output_usage(Path::new("/nonexistent/cctv-output")).await.is_err());
    }
}
