//! Core error types for the defect classification pipeline.
//!
//! This module defines the fundamental error types used throughout the crate,
//! including the main [`DefectError`] enum and the [`ProcessingStage`] enum that
//! records which pipeline stage raised an error.

use thiserror::Error;

/// Errors raised by the graph-cut segmentation passes.
///
/// These never leave the segmentation stage: a failed refinement pass falls back to
/// the previous mask, and a failed initial pass falls back to the rectangle hints.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SegmentationError {
    /// The cut rectangle has no area or does not fit inside the image.
    #[error(
        "degenerate rectangle ({x}, {y}, {width}x{height}) for {image_width}x{image_height} image"
    )]
    DegenerateRect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    /// One side of the mask has no pixels to learn a color model from.
    #[error("no {side} samples in mask")]
    EmptySamples {
        /// Either "foreground" or "background".
        side: &'static str,
    },
    /// Mask and image sizes disagree.
    #[error("mask is {mask_width}x{mask_height}, image is {image_width}x{image_height}")]
    SizeMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },
    /// The image has no pixels.
    #[error("empty image")]
    EmptyImage,
}

/// Enum representing the stages of the pipeline.
///
/// Used to identify which stage an error occurred in and as the state label of a
/// pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Reading or decoding the submitted image.
    Ingest,
    /// Background segmentation.
    Segmentation,
    /// Grayscale conversion and size bounding.
    Enhancement,
    /// Tensor preparation for the classifier.
    Preprocessing,
    /// Forward pass through the classifier.
    Inference,
    /// Label to defect code mapping.
    Mapping,
    /// Orchestration (task scheduling, joins).
    PipelineExecution,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Ingest => write!(f, "ingest"),
            ProcessingStage::Segmentation => write!(f, "segmentation"),
            ProcessingStage::Enhancement => write!(f, "enhancement"),
            ProcessingStage::Preprocessing => write!(f, "preprocessing"),
            ProcessingStage::Inference => write!(f, "inference"),
            ProcessingStage::Mapping => write!(f, "defect code mapping"),
            ProcessingStage::PipelineExecution => write!(f, "pipeline execution"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// A label that does not start with its defect-code numeral.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("label '{label}' does not start with a defect code numeral")]
pub struct MappingError {
    /// The offending label.
    pub label: String,
}

/// Enum representing the errors that can occur in the pipeline.
#[derive(Error, Debug)]
pub enum DefectError {
    /// Error occurred while decoding an image.
    #[error("image load: {0}")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred during inference.
    #[error("inference failed in model '{model_name}': {context}")]
    Inference {
        /// The name of the model where inference failed.
        model_name: String,
        /// Additional context about the inference error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred during model inference with detailed context.
    #[error("model '{model_name}' inference failed: {operation} with input shape {input_shape:?}")]
    ModelInference {
        /// The name of the model where inference failed.
        model_name: String,
        /// The operation that failed (e.g., "forward_pass", "output_extraction").
        operation: String,
        /// The input tensor shape.
        input_shape: Vec<usize>,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Bad input format, surfaced before any side effect.
    #[error("validation: {message}")]
    Validation {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// A class label violates the defect-code invariant.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor shape operations.
    #[error("tensor operation: {0}")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading a model or label file, with context and suggestions.
    #[error("model load failed for '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path to the artifact that failed to load
        model_path: String,
        /// Short reason string
        reason: String,
        /// Optional suggestion (prefixed with '; ' when present)
        suggestion: String,
        /// Underlying source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Convenient result alias used across the crate.
pub type DefectResult<T> = Result<T, DefectError>;

impl From<image::ImageError> for DefectError {
    /// Converts an image::ImageError to DefectError::ImageLoad.
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for DefectError {
    /// Converts a ConfigError to DefectError::ConfigError.
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

/// Minimal string-backed error used as a `source` when no richer error exists.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SimpleError(pub String);

impl SimpleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl DefectError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a model load error with optional suggestion and source.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use print_defect::core::errors::DefectError;
    /// let err = DefectError::model_load_error(
    ///     "models/defect.onnx",
    ///     "failed to create ONNX session",
    ///     Some("verify the model path"),
    ///     None::<std::io::Error>,
    /// );
    /// assert!(matches!(err, DefectError::ModelLoad { .. }));
    /// ```
    pub fn model_load_error<E>(
        path: impl AsRef<std::path::Path>,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<E>,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelLoad {
            model_path: path.as_ref().display().to_string(),
            reason: reason.into(),
            suggestion: suggestion.map(|s| format!("; {s}")).unwrap_or_default(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Wraps an error raised while running the model.
    pub fn inference_error(
        model_name: &str,
        context: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.to_string(),
            context: context.to_string(),
            source: Box::new(source),
        }
    }

    /// Wraps an ONNX Runtime failure with the operation and input shape.
    pub fn model_inference_error(
        model_name: &str,
        operation: &str,
        input_shape: &[usize],
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelInference {
            model_name: model_name.to_string(),
            operation: operation.to_string(),
            input_shape: input_shape.to_vec(),
            source: Box::new(source),
        }
    }

    /// Wraps an error with the stage it happened in.
    pub fn processing(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The pipeline stage this error is attributed to.
    pub fn stage(&self) -> ProcessingStage {
        match self {
            Self::ImageLoad(_) | Self::Io(_) | Self::Validation { .. } => ProcessingStage::Ingest,
            Self::Processing { kind, .. } => *kind,
            Self::Inference { .. } | Self::ModelInference { .. } | Self::Session(_) => {
                ProcessingStage::Inference
            }
            Self::Tensor(_) => ProcessingStage::Preprocessing,
            Self::Mapping(_) => ProcessingStage::Mapping,
            Self::ConfigError { .. } | Self::ModelLoad { .. } => ProcessingStage::Generic,
        }
    }
}
