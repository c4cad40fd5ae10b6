use thiserror::Error;

/// Job-level failure taxonomy. Only these variants surface to callers;
/// stage-internal errors either fall back (intent/answer/TTS, per-event SFX)
/// or propagate through `Other`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The speaker aborted the recording in-band (double flubber). The whole
    /// job is cancelled with no partial output.
    #[error("recording aborted: {reason}")]
    Aborted { reason: String },

    /// Chunked processing could not complete: a chunk had no valid storage
    /// URI before dispatch, or the global timeout expired. Callers are
    /// expected to retry via direct (non-chunked) processing.
    #[error("chunked processing failed: {reason}")]
    Chunking { reason: String },

    #[error("audio decode/encode failed: {0}")]
    Audio(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_abort(&self) -> bool {
        matches!(self, PipelineError::Aborted { .. })
    }
}
