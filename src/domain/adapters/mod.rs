//! Model adapters binding loaded models to tasks.

pub mod defect_classification_adapter;

pub use defect_classification_adapter::{
    DefectClassificationAdapter, DefectClassificationAdapterBuilder,
};
