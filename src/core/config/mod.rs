//! Configuration management for the pipeline.
//!
//! This module provides configuration types, validation traits, and utilities
//! for the segmentation, enhancement and classification stages.

pub mod errors;
pub mod onnx;
pub mod parallel;
pub mod pipeline;

// Re-export commonly used types
pub use errors::{ConfigError, ConfigValidator};
pub use onnx::*;
pub use parallel::ParallelPolicy;
pub use pipeline::{ClassifierConfig, EnhancementConfig, PipelineConfig, SegmentationConfig};
