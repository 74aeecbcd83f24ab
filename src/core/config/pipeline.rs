//! Stage and pipeline configuration.
//!
//! Every struct here deserializes from JSON with per-field defaults, so a config
//! file only needs to name the values it changes.

use super::ConfigValidator;
use super::onnx::OrtSessionConfig;
use crate::impl_config_validator;
use crate::processors::types::{ChannelOrder, Resample};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the background segmentation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Target length of the shorter side of the working image. `0` keeps the
    /// original size.
    pub resize_to: u32,
    /// Filter used for the working resize.
    pub resample: Resample,
    /// Inset of the background rectangle from each edge, as a fraction of that
    /// dimension.
    pub bg_margin: f32,
    /// Size of the centered foreground-certain rectangle, as a fraction of each
    /// dimension.
    pub fg_fraction: f32,
    /// Graph-cut iterations for the rectangle-initialized pass.
    pub init_iterations: usize,
    /// Graph-cut iterations for the mask-initialized refinement pass.
    pub refine_iterations: usize,
    /// Width of the probable-background border drawn before refinement, as a
    /// multiple of the background margin in pixels.
    pub border_scale: u32,
    /// Color written to every non-foreground pixel.
    pub sentinel: [u8; 3],
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            resize_to: 500,
            resample: Resample::Triangle,
            bg_margin: 0.07,
            fg_fraction: 0.4,
            init_iterations: 3,
            refine_iterations: 10,
            border_scale: 3,
            sentinel: [0, 0, 255],
        }
    }
}

impl_config_validator!(SegmentationConfig {
    resize_to: max(8192),
    bg_margin: range(0.0, 0.5),
    fg_fraction: range(0.0, 1.0),
    init_iterations: min(1),
    refine_iterations: min(1),
});

/// Configuration for the enhancement stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Maximum output width.
    pub max_width: u32,
    /// Maximum output height.
    pub max_height: u32,
    /// Filter used when the image has to shrink.
    pub resample: Resample,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            max_width: 224,
            max_height: 224,
            resample: Resample::Lanczos3,
        }
    }
}

impl_config_validator!(EnhancementConfig {
    max_width: min(1),
    max_height: min(1),
});

/// Loading options for the classification model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Path to the ONNX model artifact.
    pub model_path: PathBuf,
    /// Path to the label file, one label per line.
    pub labels_path: PathBuf,
    /// Model input (width, height).
    pub input_size: (u32, u32),
    /// Tensor layout expected by the model.
    pub channel_order: ChannelOrder,
    /// Input tensor name; detected from the model when unset.
    pub input_name: Option<String>,
    /// Number of ONNX Runtime sessions to create for concurrent requests.
    pub session_pool_size: usize,
    /// Where to persist the optimized graph after the first load.
    pub optimized_model_path: Option<PathBuf>,
    /// ONNX Runtime session options.
    pub ort_session: Option<OrtSessionConfig>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/defect_classifier.onnx"),
            labels_path: PathBuf::from("models/labels.txt"),
            input_size: (224, 224),
            channel_order: ChannelOrder::HWC,
            input_name: None,
            session_pool_size: 1,
            optimized_model_path: None,
            ort_session: None,
        }
    }
}

impl_config_validator!(ClassifierConfig {
    model_path: path,
    labels_path: path,
    session_pool_size: min(1),
});

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Segmentation stage options.
    pub segmentation: SegmentationConfig,
    /// Enhancement stage options.
    pub enhancement: EnhancementConfig,
    /// Default for requests that do not say whether to remove the background.
    /// When set, enhancement consumes the segmented image.
    pub remove_background: bool,
    /// Default confidence threshold for requests that do not set one.
    pub confidence_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            enhancement: EnhancementConfig::default(),
            remove_background: true,
            confidence_threshold: 0.5,
        }
    }
}

impl ConfigValidator for PipelineConfig {
    fn validate(&self) -> Result<(), crate::core::config::ConfigError> {
        self.segmentation.validate()?;
        self.enhancement.validate()?;
        crate::validate_field!(self, confidence_threshold, range(0.0, 1.0));
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

impl PipelineConfig {
    /// Reads a JSON pipeline configuration file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, super::ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| super::ConfigError::InvalidConfig {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| super::ConfigError::InvalidConfig {
            message: format!("cannot parse {}: {e}", path.display()),
        })
    }
}
