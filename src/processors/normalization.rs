//! Image normalization for the classifier input.
//!
//! Pixel values are mapped per channel as `v * alpha + beta`, where
//! `alpha = scale / std` and `beta = -mean / std`. The classifier expects values in
//! `[-1, 1]`, i.e. `v / 127.5 - 1`.

use crate::core::Tensor4D;
use crate::core::errors::{DefectError, DefectResult};
use crate::processors::types::ChannelOrder;
use image::RgbImage;

/// Normalizes RGB images into classifier input tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeImage {
    /// Scaling factors for each channel (alpha = scale / std)
    pub alpha: [f32; 3],
    /// Offset values for each channel (beta = -mean / std)
    pub beta: [f32; 3],
    /// Channel ordering (CHW or HWC)
    pub order: ChannelOrder,
}

impl NormalizeImage {
    /// Creates a normalizer from scale, mean and standard deviation.
    ///
    /// # Errors
    ///
    /// Returns an error if the scale or any standard deviation is not positive,
    /// or if the resulting coefficients are not finite.
    pub fn new(
        scale: f32,
        mean: [f32; 3],
        std: [f32; 3],
        order: ChannelOrder,
    ) -> DefectResult<Self> {
        if scale <= 0.0 {
            return Err(DefectError::ConfigError {
                message: "Scale must be greater than 0".to_string(),
            });
        }
        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(DefectError::ConfigError {
                    message: format!(
                        "Standard deviation at index {i} must be greater than 0, got {s}"
                    ),
                });
            }
        }

        let alpha = [scale / std[0], scale / std[1], scale / std[2]];
        let beta = [-mean[0] / std[0], -mean[1] / std[1], -mean[2] / std[2]];
        if alpha.iter().chain(beta.iter()).any(|v| !v.is_finite()) {
            return Err(DefectError::ConfigError {
                message: "normalization coefficients are not finite".to_string(),
            });
        }

        Ok(Self { alpha, beta, order })
    }

    /// The `[-1, 1]` mapping used by the defect classifier: `v / 127.5 - 1`.
    pub fn symmetric_unit(order: ChannelOrder) -> Self {
        Self {
            alpha: [1.0 / 127.5; 3],
            beta: [-1.0; 3],
            order,
        }
    }

    /// Normalizes one image into a batch-of-one tensor.
    ///
    /// The tensor is `[1, H, W, 3]` for HWC and `[1, 3, H, W]` for CHW.
    pub fn normalize_to(&self, img: &RgbImage) -> DefectResult<Tensor4D> {
        let (width, height) = img.dimensions();
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 {
            return Err(DefectError::validation("cannot normalize an empty image"));
        }

        let shape = match self.order {
            ChannelOrder::CHW => (1, 3, h, w),
            ChannelOrder::HWC => (1, h, w, 3),
        };
        let mut data = vec![0.0f32; 3 * h * w];

        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = pixel[c] as f32 * self.alpha[c] + self.beta[c];
                let dst_idx = match self.order {
                    ChannelOrder::CHW => c * h * w + y * w + x,
                    ChannelOrder::HWC => y * w * 3 + x * 3 + c,
                };
                data[dst_idx] = value;
            }
        }

        Ok(Tensor4D::from_shape_vec(shape, data)?)
    }
}
