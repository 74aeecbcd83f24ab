//! The core module of the defect classification pipeline.
//!
//! This module contains the fundamental components shared by every stage:
//! - Configuration management
//! - Error handling
//! - Inference engine integration
//! - The process-wide model handle and its cache
//! - Traits defining tasks and model adapters
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod config;
pub mod errors;
pub mod inference;
#[macro_use]
pub mod macros;
pub mod model;
pub mod traits;

/// Four-dimensional `f32` tensor fed to the classifier.
pub type Tensor4D = ndarray::Array4<f32>;

pub use config::{
    ClassifierConfig, ConfigError, ConfigValidator, EnhancementConfig,
    ParallelPolicy, PipelineConfig, SegmentationConfig,
};
pub use errors::{
    DefectError, DefectResult, MappingError, ProcessingStage, SegmentationError, SimpleError,
};
pub use inference::{ClassifierBackend, OrtInfer};
pub use model::{ModelCache, ModelHandle, SharedModel, load_labels};
pub use traits::{AdapterBuilder, AdapterInfo, ModelAdapter, Task, TaskType};
