//! Task definitions.

pub mod defect_classification;

pub use defect_classification::{
    ClassScores, ClassificationResult, DefectClassificationConfig, DefectClassificationInput,
    DefectClassificationTask, ERROR_PREFIX, LOW_CONFIDENCE_MESSAGE,
};
