//! Per-image pipeline outcome.

use crate::domain::{ClassificationResult, DefectCode};
use crate::processors::MaskSource;
use serde::Serialize;

/// Lifecycle of one image through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Ingested,
    Segmenting,
    Enhancing,
    Inferring,
    Mapped,
    Done,
    /// The classifier did not produce an accepted result.
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Ingested => "ingested",
            PipelineState::Segmenting => "segmenting",
            PipelineState::Enhancing => "enhancing",
            PipelineState::Inferring => "inferring",
            PipelineState::Mapped => "mapped",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records state transitions and logs each one.
#[derive(Debug)]
pub(crate) struct StateTracker {
    state: PipelineState,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: PipelineState::Ingested,
        }
    }

    pub(crate) fn advance(&mut self, next: PipelineState) {
        tracing::debug!(from = %self.state, to = %next, "state");
        self.state = next;
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }
}

/// Everything the pipeline learned about one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    /// Classifier outcome.
    #[serde(flatten)]
    pub result: ClassificationResult,
    /// Defect code of a successful classification.
    pub defect: Option<DefectCode>,
    /// Terminal state: `Done` or `Failed`.
    pub state: PipelineState,
    /// How the segmentation mask was obtained, when segmentation ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<MaskSource>,
}

impl Inspection {
    /// Whether segmentation had to fall back to an earlier mask.
    pub fn segmentation_recovered(&self) -> bool {
        self.segmentation
            .as_ref()
            .is_some_and(MaskSource::recovered)
    }
}
