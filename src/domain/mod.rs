//! Domain layer: tasks, the adapters that run them, and defect codes.

pub mod adapters;
pub mod defect_code;
pub mod tasks;

pub use adapters::{DefectClassificationAdapter, DefectClassificationAdapterBuilder};
pub use defect_code::DefectCode;
pub use tasks::{
    ClassScores, ClassificationResult, DefectClassificationConfig, DefectClassificationInput,
    DefectClassificationTask,
};
