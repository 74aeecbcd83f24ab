//! # Print Defect
//! Classifies photographs of in-progress 3D prints by defect type using an ONNX model.
//!
//! Each photograph goes through graph-cut background removal, grayscale
//! enhancement and a single classifier forward pass. The top class is accepted
//! only above a confidence threshold and mapped to a numeric defect code.
//!
//! ## Modules
//! * [`core`] - Configuration, errors, ONNX Runtime inference and the shared model
//! * [`domain`] - The classification task, its adapter and defect codes
//! * [`pipeline`] - Orchestration of the stages, batches and upload ingest
//! * [`processors`] - Segmentation, enhancement and tensor normalization
//! * [`utils`] - Image helpers and logging setup
//!
//! ## Quick Start
//! ```rust,no_run
//! use print_defect::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ModelCache::from_config(ClassifierConfig::default());
//! let adapter = DefectClassificationAdapterBuilder::new().build(cache.get_or_init()?)?;
//! let pipeline = Pipeline::new(PipelineConfig::default(), adapter, ParallelPolicy::default())?;
//!
//! let inspection = pipeline
//!     .inspect(ImageSource::Path("print.jpg".into()), &InspectOptions::default())
//!     .await?;
//! println!("{}", serde_json::to_string(&inspection)?);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::config::{ClassifierConfig, ParallelPolicy, PipelineConfig};
    pub use crate::core::traits::{AdapterBuilder, ModelAdapter};
    pub use crate::core::{DefectError, DefectResult, ModelCache, SharedModel};
    pub use crate::domain::{
        ClassificationResult, DefectClassificationAdapter, DefectClassificationAdapterBuilder,
        DefectCode,
    };
    pub use crate::pipeline::{
        ImageSource, InspectOptions, Inspection, IngestCoordinator, MemoryRecordStore, Pipeline,
    };
    pub use crate::utils::init_tracing;
}
