//! The defect classification task: types, configuration and validation.

use crate::core::errors::DefectError;
use crate::core::traits::{Task, TaskType};
use crate::impl_config_validator;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message attached to every low-confidence result.
pub const LOW_CONFIDENCE_MESSAGE: &str = "Prediction confidence too low";
/// Prefix of every error result message.
pub const ERROR_PREFIX: &str = "Prediction failed: ";

/// Outcome of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationResult {
    /// The top class cleared the confidence threshold.
    Success {
        /// Label of the top class.
        class_name: String,
        /// Probability of the top class.
        confidence: f32,
        /// Probability of every known label.
        predictions: BTreeMap<String, f32>,
    },
    /// The top class did not clear the threshold.
    LowConfidence {
        /// Probability of the top class.
        confidence: f32,
        message: String,
    },
    /// Preprocessing or inference failed.
    Error { message: String },
}

impl ClassificationResult {
    pub fn low_confidence(confidence: f32) -> Self {
        Self::LowConfidence {
            confidence,
            message: LOW_CONFIDENCE_MESSAGE.to_string(),
        }
    }

    pub fn error(err: impl std::fmt::Display) -> Self {
        Self::Error {
            message: format!("{ERROR_PREFIX}{err}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The top-class probability, when one was computed.
    pub fn confidence(&self) -> Option<f32> {
        match self {
            Self::Success { confidence, .. } | Self::LowConfidence { confidence, .. } => {
                Some(*confidence)
            }
            Self::Error { .. } => None,
        }
    }

    /// The predicted label of a success.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Success { class_name, .. } => Some(class_name),
            _ => None,
        }
    }
}

/// Configuration for the defect classification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefectClassificationConfig {
    /// Minimum top-class probability for a success.
    pub score_threshold: f32,
}

impl Default for DefectClassificationConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
        }
    }
}

impl_config_validator!(DefectClassificationConfig {
    score_threshold: range(0.0, 1.0),
});

/// A single image to classify.
#[derive(Debug, Clone)]
pub struct DefectClassificationInput {
    pub image: DynamicImage,
}

impl DefectClassificationInput {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }
}

/// Raw class probabilities in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub probabilities: Vec<f32>,
}

impl ClassScores {
    /// Index and value of the highest probability.
    pub fn top(&self) -> Option<(usize, f32)> {
        self.probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })
    }
}

/// Contract of the classification model: one image in, one probability per
/// label out.
#[derive(Debug, Clone)]
pub struct DefectClassificationTask {
    label_count: usize,
}

impl DefectClassificationTask {
    pub fn new(label_count: usize) -> Self {
        Self { label_count }
    }
}

impl Task for DefectClassificationTask {
    type Config = DefectClassificationConfig;
    type Input = DefectClassificationInput;
    type Output = ClassScores;

    fn task_type(&self) -> TaskType {
        TaskType::DefectClassification
    }

    fn validate_input(&self, input: &Self::Input) -> Result<(), DefectError> {
        if input.image.width() == 0 || input.image.height() == 0 {
            return Err(DefectError::validation(format!(
                "image has no pixels ({}x{})",
                input.image.width(),
                input.image.height()
            )));
        }
        Ok(())
    }

    fn validate_output(&self, output: &Self::Output) -> Result<(), DefectError> {
        if output.probabilities.len() != self.label_count {
            return Err(DefectError::validation(format!(
                "model returned {} scores for {} labels",
                output.probabilities.len(),
                self.label_count
            )));
        }
        for (idx, &p) in output.probabilities.iter().enumerate() {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(DefectError::validation(format!(
                    "score {idx} is not a probability: {p}"
                )));
            }
        }
        Ok(())
    }
}
