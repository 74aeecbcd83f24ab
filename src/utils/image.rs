//! Image loading and geometry helpers shared by the pipeline stages.

use crate::core::errors::{DefectError, DefectResult};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::path::Path;

/// File extensions the pipeline accepts, lowercase.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Whether `path` has one of [`ALLOWED_EXTENSIONS`], case-insensitively.
pub fn has_allowed_extension(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Decodes an in-memory image and converts it to RGB.
pub fn decode_image(bytes: &[u8]) -> DefectResult<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(DefectError::ImageLoad)?;
    Ok(img.to_rgb8())
}

/// Dimensions after scaling so the shorter side equals `target`, rounded to the
/// nearest pixel and never below 1.
pub fn shorter_side_dims(width: u32, height: u32, target: u32) -> (u32, u32) {
    let ratio = target as f64 / width.min(height).max(1) as f64;
    let scale = |v: u32| ((v as f64 * ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

/// Resizes so the shorter side equals `target`. `target == 0` returns a copy.
pub fn resize_shorter_side(img: &RgbImage, target: u32, filter: FilterType) -> RgbImage {
    if target == 0 {
        return img.clone();
    }
    let (w, h) = shorter_side_dims(img.width(), img.height(), target);
    if (w, h) == img.dimensions() {
        return img.clone();
    }
    imageops::resize(img, w, h, filter)
}

/// Dimensions that fit `width`×`height` inside `max_width`×`max_height` with the
/// aspect preserved, or `None` when the image already fits.
pub fn thumbnail_dims(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    if scale >= 1.0 {
        return None;
    }
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    Some((w, h))
}

/// Centered crop window `(x, y, w, h)` with the aspect ratio of
/// `target_width`×`target_height`.
pub fn center_crop_window(
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
) -> (u32, u32, u32, u32) {
    let target_ratio = target_width as f64 / target_height as f64;
    let live_ratio = width as f64 / height as f64;
    let (crop_w, crop_h) = if live_ratio > target_ratio {
        (((height as f64 * target_ratio).round() as u32).clamp(1, width), height)
    } else {
        (width, ((width as f64 / target_ratio).round() as u32).clamp(1, height))
    };
    ((width - crop_w) / 2, (height - crop_h) / 2, crop_w, crop_h)
}

/// Crops to the target aspect around the center, then resizes to exactly
/// `target_width`×`target_height`.
pub fn fit_and_crop(
    img: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> DefectResult<RgbImage> {
    if img.width() == 0 || img.height() == 0 {
        return Err(DefectError::validation("cannot fit an empty image"));
    }
    if target_width == 0 || target_height == 0 {
        return Err(DefectError::validation(format!(
            "invalid fit target {target_width}x{target_height}"
        )));
    }
    let rgb = img.to_rgb8();
    let (x, y, w, h) = center_crop_window(rgb.width(), rgb.height(), target_width, target_height);
    let cropped = imageops::crop_imm(&rgb, x, y, w, h).to_image();
    if cropped.dimensions() == (target_width, target_height) {
        return Ok(cropped);
    }
    Ok(imageops::resize(&cropped, target_width, target_height, filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        assert!(has_allowed_extension("a/b/print.PNG"));
        assert!(has_allowed_extension("shot.jpeg"));
        assert!(!has_allowed_extension("notes.txt"));
        assert!(!has_allowed_extension("png"));
    }

    #[test]
    fn test_shorter_side_dims_rounds() {
        assert_eq!(shorter_side_dims(1000, 750, 500), (667, 500));
        assert_eq!(shorter_side_dims(300, 900, 500), (500, 1500));
        assert_eq!(shorter_side_dims(40, 40, 48), (48, 48));
    }

    #[test]
    fn test_resize_zero_is_identity() {
        let img = RgbImage::new(31, 17);
        let out = resize_shorter_side(&img, 0, FilterType::Triangle);
        assert_eq!(out.dimensions(), (31, 17));
    }

    #[test]
    fn test_thumbnail_dims() {
        assert_eq!(thumbnail_dims(448, 224, 224, 224), Some((224, 112)));
        assert_eq!(thumbnail_dims(224, 100, 224, 224), None);
        assert_eq!(thumbnail_dims(10_000, 10, 224, 224), Some((224, 1)));
    }

    #[test]
    fn test_fit_and_crop_exact_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 360));
        let out = fit_and_crop(&img, 224, 224, FilterType::Lanczos3).unwrap();
        assert_eq!(out.dimensions(), (224, 224));
        assert_eq!(center_crop_window(640, 360, 224, 224), (140, 0, 360, 360));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(DefectError::ImageLoad(_))
        ));
    }
}
