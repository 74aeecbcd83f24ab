//! Types used in image processing operations
//!
//! Enums describing tensor layout and resampling choices for the pipeline stages.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Specifies the order of channels in an image tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Channel, Height, Width order (common in PyTorch exports)
    CHW,
    /// Height, Width, Channel order (Keras/TensorFlow exports)
    #[default]
    HWC,
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chw" | "nchw" => Ok(ChannelOrder::CHW),
            "hwc" | "nhwc" => Ok(ChannelOrder::HWC),
            other => Err(format!("unknown channel order '{other}', expected 'chw' or 'hwc'")),
        }
    }
}

/// Resampling filter used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resample {
    /// Nearest neighbour.
    Nearest,
    /// Bilinear (tent) filter, close to area averaging when shrinking.
    #[default]
    Triangle,
    /// Bicubic.
    CatmullRom,
    /// Lanczos with window 3; used wherever high-quality downscaling matters.
    Lanczos3,
}

impl From<Resample> for FilterType {
    fn from(value: Resample) -> Self {
        match value {
            Resample::Nearest => FilterType::Nearest,
            Resample::Triangle => FilterType::Triangle,
            Resample::CatmullRom => FilterType::CatmullRom,
            Resample::Lanczos3 => FilterType::Lanczos3,
        }
    }
}
