//! Frame decoding, area-averaging downscale, face crops, and NHWC tensor packing.

use crate::types::FaceRegion;
use image::RgbImage;
use ndarray::Array4;
use thiserror::Error;

/// Largest frame the pipeline works on; bigger uploads are shrunk to fit.
pub const MAX_FRAME_WIDTH: u32 = 800;
pub const MAX_FRAME_HEIGHT: u32 = 600;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero dimensions")]
    Empty,
}

/// Channel order of a packed tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Decode uploaded bytes (PNG/JPEG) into an RGB frame.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, FrameError> {
    let frame = image::load_from_memory(bytes)?.to_rgb8();
    if frame.width() == 0 || frame.height() == 0 {
        return Err(FrameError::Empty);
    }
    Ok(frame)
}

/// Shrink a frame to fit within `max_w × max_h`, preserving aspect ratio.
///
/// Frames already within bounds are returned untouched; frames are never enlarged.
pub fn fit_within(frame: RgbImage, max_w: u32, max_h: u32) -> RgbImage {
    let (w, h) = frame.dimensions();
    if w <= max_w && h <= max_h {
        return frame;
    }

    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let new_w = ((w as f64 * scale) as u32).max(1);
    let new_h = ((h as f64 * scale) as u32).max(1);

    tracing::debug!(from = ?(w, h), to = ?(new_w, new_h), "downscaling frame");
    area_resize(&frame, new_w, new_h)
}

/// Downscale by area averaging: each output pixel is the coverage-weighted
/// mean of the source pixels under its footprint.
pub fn area_resize(src: &RgbImage, dst_w: u32, dst_h: u32) -> RgbImage {
    let (sw, sh) = src.dimensions();
    let mut out = RgbImage::new(dst_w, dst_h);
    if sw == 0 || sh == 0 || dst_w == 0 || dst_h == 0 {
        return out;
    }

    let sx = sw as f64 / dst_w as f64;
    let sy = sh as f64 / dst_h as f64;

    for dy in 0..dst_h {
        let y0 = dy as f64 * sy;
        let y1 = y0 + sy;
        let ys = y0.floor() as u32..(y1.ceil() as u32).min(sh);

        for dx in 0..dst_w {
            let x0 = dx as f64 * sx;
            let x1 = x0 + sx;
            let xs = x0.floor() as u32..(x1.ceil() as u32).min(sw);

            let mut acc = [0.0f64; 3];
            let mut area = 0.0f64;
            for y in ys.clone() {
                let wy = y1.min(y as f64 + 1.0) - y0.max(y as f64);
                if wy <= 0.0 {
                    continue;
                }
                for x in xs.clone() {
                    let wx = x1.min(x as f64 + 1.0) - x0.max(x as f64);
                    if wx <= 0.0 {
                        continue;
                    }
                    let weight = wx * wy;
                    let p = src.get_pixel(x, y);
                    for c in 0..3 {
                        acc[c] += p[c] as f64 * weight;
                    }
                    area += weight;
                }
            }

            if area > 0.0 {
                let px = out.get_pixel_mut(dx, dy);
                for c in 0..3 {
                    px[c] = (acc[c] / area).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }

    out
}

/// Copy the region out of the frame, clamped to frame bounds.
///
/// Returns `None` for an empty crop.
pub fn crop(frame: &RgbImage, region: &FaceRegion) -> Option<RgbImage> {
    let (w, h) = frame.dimensions();
    let left = region.left.min(w);
    let right = region.right.min(w);
    let top = region.top.min(h);
    let bottom = region.bottom.min(h);
    if right <= left || bottom <= top {
        return None;
    }
    Some(image::imageops::crop_imm(frame, left, top, right - left, bottom - top).to_image())
}

/// Pack an RGB image into a `[1, H, W, 3]` tensor, mapping each channel value through `normalize`.
pub fn nhwc_tensor(img: &RgbImage, order: ChannelOrder, normalize: impl Fn(f32) -> f32) -> Array4<f32> {
    let (w, h) = img.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, h as usize, w as usize, 3));
    for (x, y, px) in img.enumerate_pixels() {
        let channels = match order {
            ChannelOrder::Rgb => [px[0], px[1], px[2]],
            ChannelOrder::Bgr => [px[2], px[1], px[0]],
        };
        for (c, v) in channels.iter().enumerate() {
            tensor[[0, y as usize, x as usize, c]] = normalize(*v as f32);
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(color))
    }

    #[test]
    fn test_fit_within_keeps_small_frames() {
        let out = fit_within(solid(640, 480, [1, 2, 3]), MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT);
        assert_eq!(out.dimensions(), (640, 480));
    }

    #[test]
    fn test_fit_within_preserves_aspect() {
        let out = fit_within(solid(1600, 1200, [9, 9, 9]), MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT);
        assert_eq!(out.dimensions(), (800, 600));

        let out = fit_within(solid(1000, 500, [9, 9, 9]), MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT);
        assert_eq!(out.dimensions(), (800, 400));

        let out = fit_within(solid(400, 1200, [9, 9, 9]), MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT);
        assert_eq!(out.dimensions(), (200, 600));
    }

    #[test]
    fn test_area_resize_uniform() {
        let out = area_resize(&solid(100, 100, [128, 64, 32]), 37, 41);
        assert!(out.pixels().all(|p| p.0 == [128, 64, 32]));
    }

    #[test]
    fn test_area_resize_averages_blocks() {
        // 4x2 frame: left half black, right half white → 2x1 halves stay pure.
        let mut img = RgbImage::new(4, 2);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if x < 2 { Rgb([0, 0, 0]) } else { Rgb([200, 200, 200]) };
        }
        let out = area_resize(&img, 2, 1);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [200, 200, 200]);

        // 4x2 → 1x1 is the global mean.
        let out = area_resize(&img, 1, 1);
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100]);
    }

    #[test]
    fn test_crop_clamps_and_rejects_empty() {
        let frame = solid(50, 40, [0, 0, 0]);
        let c = crop(&frame, &FaceRegion::new(30, 60, 50, 10)).unwrap();
        assert_eq!(c.dimensions(), (40, 10));
        assert!(crop(&frame, &FaceRegion::new(10, 10, 20, 10)).is_none());
        assert!(crop(&frame, &FaceRegion::new(45, 20, 60, 0)).is_none());
    }

    #[test]
    fn test_nhwc_tensor_channel_order() {
        let img = solid(2, 3, [10, 20, 30]);
        let rgb = nhwc_tensor(&img, ChannelOrder::Rgb, |v| v);
        assert_eq!(rgb.shape(), &[1, 3, 2, 3]);
        assert_eq!(rgb[[0, 0, 0, 0]], 10.0);
        let bgr = nhwc_tensor(&img, ChannelOrder::Bgr, |v| v / 10.0);
        assert_eq!(bgr[[0, 2, 1, 0]], 3.0);
        assert_eq!(bgr[[0, 2, 1, 2]], 1.0);
    }

    #[test]
    fn test_decode_png_and_garbage() {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(solid(8, 6, [1, 2, 3]))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(decode(&bytes).unwrap().dimensions(), (8, 6));
        assert!(matches!(decode(b"not an image"), Err(FrameError::Decode(_))));
    }
}
