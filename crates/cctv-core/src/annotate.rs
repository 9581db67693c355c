//! Detection overlays: one box and one `name (NN%)` label per face.

use crate::types::FaceResult;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 16.0;
/// Gap between the label baseline and the top edge of the box.
const LABEL_GAP: i32 = 4;

/// DejaVu Sans, compiled in so labels never depend on the working directory.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Draws detection results onto frames.
///
/// `Default` has no font and draws boxes only.
#[derive(Clone, Default)]
pub struct FrameAnnotator {
    font: Option<FontArc>,
}

impl FrameAnnotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// Annotator labelling with the bundled font.
    pub fn bundled() -> Self {
        match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Self::new(Some(font)),
            Err(e) => {
                tracing::error!(error = %e, "bundled label font is invalid; annotations will omit text");
                Self::new(None)
            }
        }
    }

    /// Label with the font at `path`, or the bundled one if it cannot be loaded.
    pub fn with_font_file(path: &Path) -> Self {
        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|e| e.to_string()));
        match font {
            Ok(font) => {
                tracing::info!(path = %path.display(), "loaded label font");
                Self::new(Some(font))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "label font unavailable; using bundled font");
                Self::bundled()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Return a copy of `frame` with every result drawn on it.
    ///
    /// Recognized faces are boxed in green, unknown ones in red. If drawing
    /// fails, the original frame is returned unchanged.
    pub fn annotate(&self, frame: &RgbImage, results: &[FaceResult]) -> RgbImage {
        let drawn = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut canvas = frame.clone();
            for face in results {
                self.draw_face(&mut canvas, face);
            }
            canvas
        }));

        drawn.unwrap_or_else(|_| {
            tracing::error!("annotation failed; keeping the original frame");
            frame.clone()
        })
    }

    fn draw_face(&self, canvas: &mut RgbImage, face: &FaceResult) {
        let color = if face.is_unknown() { UNKNOWN_COLOR } else { KNOWN_COLOR };
        let region = &face.location;

        for inset in 0..BOX_THICKNESS {
            let w = region.width().saturating_sub(2 * inset);
            let h = region.height().saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((region.left + inset) as i32, (region.top + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        if let Some(font) = &self.font {
            let y = region.top as i32 - LABEL_GAP - LABEL_SCALE as i32;
            draw_text_mut(
                canvas,
                color,
                region.left as i32,
                y,
                PxScale::from(LABEL_SCALE),
                font,
                &label_text(face),
            );
        }
    }
}

/// `"<name> (<confidence as whole percent>%)"`.
pub fn label_text(face: &FaceResult) -> String {
    format!("{} ({}%)", face.name, (face.face_confidence * 100.0).round() as i32)
}
