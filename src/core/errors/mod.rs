//! Error types for the pipeline.

mod types;

pub use types::{
    DefectError, DefectResult, MappingError, ProcessingStage, SegmentationError, SimpleError,
};
