//! Traits describing tasks and the adapters that execute them.
//!
//! A [`Task`] defines the input/output contract of one model-backed operation and
//! how to validate both sides. A [`ModelAdapter`] binds a concrete model to a
//! task; an [`AdapterBuilder`] constructs the adapter from its configuration.

use crate::core::errors::DefectError;
use crate::core::model::SharedModel;

/// Kinds of tasks the crate knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Print defect classification.
    DefectClassification,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::DefectClassification => write!(f, "defect_classification"),
        }
    }
}

/// Input/output contract of a task.
pub trait Task: Send + Sync {
    /// Per-call configuration.
    type Config: Clone + Send + Sync;
    /// Task input.
    type Input;
    /// Task output.
    type Output;

    /// The kind of task.
    fn task_type(&self) -> TaskType;

    /// Rejects inputs the model cannot run on.
    fn validate_input(&self, input: &Self::Input) -> Result<(), DefectError>;

    /// Rejects raw outputs that violate the task's invariants.
    fn validate_output(&self, output: &Self::Output) -> Result<(), DefectError>;
}

/// Descriptive metadata for an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Adapter name.
    pub model_name: String,
    /// Adapter version.
    pub version: String,
    /// Task type served.
    pub task_type: TaskType,
    /// Human-readable description.
    pub description: String,
}

impl AdapterInfo {
    /// Creates adapter info.
    pub fn new(
        model_name: impl Into<String>,
        version: impl Into<String>,
        task_type: TaskType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            version: version.into(),
            task_type,
            description: description.into(),
        }
    }
}

/// A model bound to a task.
pub trait ModelAdapter: Send + Sync {
    /// The task this adapter executes.
    type Task: Task;

    /// Adapter metadata.
    fn info(&self) -> AdapterInfo;

    /// Runs the task, using `config` in place of the adapter's own when given.
    fn execute(
        &self,
        input: <Self::Task as Task>::Input,
        config: Option<&<Self::Task as Task>::Config>,
    ) -> <Self::Task as Task>::Output;
}

/// Builds an adapter around a shared model.
pub trait AdapterBuilder: Sized {
    /// Task configuration accepted by the builder.
    type Config;
    /// Adapter produced.
    type Adapter: ModelAdapter;

    /// Validates the configuration and builds the adapter.
    fn build(self, model: SharedModel) -> Result<Self::Adapter, DefectError>;

    /// Replaces the task configuration.
    fn with_config(self, config: Self::Config) -> Self;

    /// Short adapter type name.
    fn adapter_type(&self) -> &str;
}
