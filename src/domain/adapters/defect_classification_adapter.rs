//! Defect classification adapter.
//!
//! Binds the shared classifier to the classification task: fit-and-crop to the
//! model input size, normalize, run the forward pass, validate the scores and
//! gate on confidence. Every failure inside the adapter becomes an
//! [`ClassificationResult::Error`] rather than an `Err`.

use crate::core::config::ConfigValidator;
use crate::core::errors::{DefectError, DefectResult};
use crate::core::model::SharedModel;
use crate::core::traits::{AdapterBuilder, AdapterInfo, ModelAdapter, Task, TaskType};
use crate::domain::tasks::{
    ClassScores, ClassificationResult, DefectClassificationConfig, DefectClassificationInput,
    DefectClassificationTask,
};
use crate::processors::normalization::NormalizeImage;
use crate::processors::types::ChannelOrder;
use crate::utils::fit_and_crop;
use image::imageops::FilterType;
use std::collections::BTreeMap;

/// Adapter running the defect classifier.
#[derive(Debug)]
pub struct DefectClassificationAdapter {
    model: SharedModel,
    task: DefectClassificationTask,
    info: AdapterInfo,
    config: DefectClassificationConfig,
    input_size: (u32, u32),
    normalizer: NormalizeImage,
}

impl DefectClassificationAdapter {
    /// Default model input (width, height).
    pub const DEFAULT_INPUT_SHAPE: (u32, u32) = (224, 224);

    /// The shared model.
    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    /// The adapter's default task configuration.
    pub fn config(&self) -> &DefectClassificationConfig {
        &self.config
    }

    fn classify(
        &self,
        input: &DefectClassificationInput,
        config: &DefectClassificationConfig,
    ) -> DefectResult<ClassificationResult> {
        self.task.validate_input(input)?;

        let (width, height) = self.input_size;
        let fitted = fit_and_crop(&input.image, width, height, FilterType::Lanczos3)?;
        let tensor = self.normalizer.normalize_to(&fitted)?;

        let scores = ClassScores {
            probabilities: self.model.backend().forward(&tensor)?,
        };
        self.task.validate_output(&scores)?;

        let (index, confidence) = scores
            .top()
            .ok_or_else(|| DefectError::validation("model returned no scores"))?;
        if confidence < config.score_threshold {
            tracing::debug!(confidence, threshold = config.score_threshold, "low confidence");
            return Ok(ClassificationResult::low_confidence(confidence));
        }

        let labels = self.model.labels();
        let predictions: BTreeMap<String, f32> = labels
            .iter()
            .cloned()
            .zip(scores.probabilities.iter().copied())
            .collect();
        Ok(ClassificationResult::Success {
            class_name: labels[index].clone(),
            confidence,
            predictions,
        })
    }
}

impl ModelAdapter for DefectClassificationAdapter {
    type Task = DefectClassificationTask;

    fn info(&self) -> AdapterInfo {
        self.info.clone()
    }

    fn execute(
        &self,
        input: DefectClassificationInput,
        config: Option<&DefectClassificationConfig>,
    ) -> ClassificationResult {
        let effective_config = config.unwrap_or(&self.config);
        match self.classify(&input, effective_config) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    model = self.model.backend().name(),
                    stage = %err.stage(),
                    error = %err,
                    "classification failed"
                );
                ClassificationResult::error(err)
            }
        }
    }
}

/// Builder for [`DefectClassificationAdapter`].
#[derive(Debug, Clone)]
pub struct DefectClassificationAdapterBuilder {
    config: DefectClassificationConfig,
    input_size: (u32, u32),
    channel_order: ChannelOrder,
    model_name_override: Option<String>,
}

impl DefectClassificationAdapterBuilder {
    pub fn new() -> Self {
        Self {
            config: DefectClassificationConfig::default(),
            input_size: DefectClassificationAdapter::DEFAULT_INPUT_SHAPE,
            channel_order: ChannelOrder::default(),
            model_name_override: None,
        }
    }

    /// Sets the model input (width, height).
    pub fn input_size(mut self, input_size: (u32, u32)) -> Self {
        self.input_size = input_size;
        self
    }

    /// Sets the tensor layout the model expects.
    pub fn channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    /// Sets the confidence threshold.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.score_threshold = threshold;
        self
    }

    /// Sets the name reported in [`AdapterInfo`].
    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name_override = Some(model_name.into());
        self
    }
}

impl Default for DefectClassificationAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterBuilder for DefectClassificationAdapterBuilder {
    type Config = DefectClassificationConfig;
    type Adapter = DefectClassificationAdapter;

    fn build(self, model: SharedModel) -> Result<Self::Adapter, DefectError> {
        self.config.validate()?;
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            return Err(DefectError::ConfigError {
                message: format!(
                    "input size must be positive, got {}x{}",
                    self.input_size.0, self.input_size.1
                ),
            });
        }

        let mut info = AdapterInfo::new(
            "defect_classification",
            env!("CARGO_PKG_VERSION"),
            TaskType::DefectClassification,
            "Print defect classification from a single photograph",
        );
        info.model_name = self
            .model_name_override
            .unwrap_or_else(|| model.backend().name().to_string());

        Ok(DefectClassificationAdapter {
            task: DefectClassificationTask::new(model.labels().len()),
            model,
            info,
            config: self.config,
            input_size: self.input_size,
            normalizer: NormalizeImage::symmetric_unit(self.channel_order),
        })
    }

    fn with_config(mut self, config: Self::Config) -> Self {
        self.config = config;
        self
    }

    fn adapter_type(&self) -> &str {
        "DefectClassification"
    }
}
