//! Grayscale conversion and size bounding.

use crate::core::config::EnhancementConfig;
use crate::utils::thumbnail_dims;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

/// Bounds an image to the configured maximum size and converts it to grayscale.
///
/// Downscaling preserves the aspect ratio; images that already fit are never
/// resampled, which makes the stage idempotent byte-for-byte.
#[derive(Debug, Clone, Default)]
pub struct Enhancer {
    config: EnhancementConfig,
}

impl Enhancer {
    /// Creates an enhancer with the given configuration.
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    /// Runs the stage.
    pub fn enhance(&self, img: &DynamicImage) -> GrayImage {
        let bounded = match thumbnail_dims(
            img.width(),
            img.height(),
            self.config.max_width,
            self.config.max_height,
        ) {
            Some((w, h)) => {
                tracing::debug!(
                    from_width = img.width(),
                    from_height = img.height(),
                    to_width = w,
                    to_height = h,
                    "downscaling"
                );
                img.resize_exact(w, h, FilterType::from(self.config.resample))
            }
            None => img.clone(),
        };
        bounded.to_luma8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_bounds_and_preserves_aspect() {
        let out = Enhancer::default().enhance(&gradient(640, 480));
        assert_eq!(out.dimensions(), (224, 168));
    }

    #[test]
    fn test_never_upscales() {
        let out = Enhancer::default().enhance(&gradient(100, 50));
        assert_eq!(out.dimensions(), (100, 50));
    }

    #[test]
    fn test_idempotent() {
        let enhancer = Enhancer::default();
        let once = enhancer.enhance(&gradient(500, 333));
        let twice = enhancer.enhance(&DynamicImage::ImageLuma8(once.clone()));
        assert_eq!(once.dimensions(), twice.dimensions());
        assert_eq!(once.as_raw(), twice.as_raw());
    }

    #[test]
    fn test_custom_bounds() {
        let enhancer = Enhancer::new(EnhancementConfig {
            max_width: 64,
            max_height: 32,
            ..Default::default()
        });
        assert_eq!(enhancer.enhance(&gradient(128, 128)).dimensions(), (32, 32));
    }
}
