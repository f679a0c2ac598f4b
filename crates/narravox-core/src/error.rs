//! Error types for the narravox annotation pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while annotating a script.
///
/// Only `UnresolvedDialogue` is fatal to a run; batch-level bridge failures
/// are tolerated and patched by the refinement passes.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("completion bridge error: {0}")]
    Bridge(String),

    #[error("completion call timed out after {0}s")]
    Deadline(u64),

    #[error("malformed direction payload: {0}")]
    Payload(String),

    #[error("dialogue segments left without usable delivery tags: {indices:?}")]
    UnresolvedDialogue { indices: Vec<usize> },
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Bridge(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Payload(err.to_string())
    }
}
