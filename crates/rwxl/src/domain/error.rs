//! Typed errors at the component boundaries.
//!
//! The rest of the crate leans on `anyhow` for propagation and context, the way
//! the teacher crate does — but a few error shapes need to be matched on by
//! callers (the coordinator deciding whether a fan-in failure is a partial
//! completion, the state store rejecting an illegal transition), so those get
//! a real enum instead of a string buried in an `anyhow::Context`.

use uuid::Uuid;

use super::task::TaskStatus;

/// The five error kinds from the design's error-handling section, plus the
/// state-machine violation that the task-state store raises directly.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// Bad archive, missing field — surfaced to the submitter, no task row
    /// mutated.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Blob I/O, bus publish, translator network — retried locally with
    /// backoff; this variant is what's left after the retry budget runs out.
    #[error("transient downstream failure: {0}")]
    TransientDownstream(String),

    /// Translator content error, archive parse error — terminates the task.
    #[error("permanent downstream failure: {0}")]
    PermanentDownstream(String),

    /// Illegal status transition or unknown task id.
    #[error("invalid task state transition: {from:?} -> {to:?}")]
    InvalidTaskStateTransition { from: TaskStatus, to: TaskStatus },

    #[error("unknown task: {0}")]
    UnknownTask(Uuid),

    /// Some files in the fan-out failed; the task moves to FAILED with this
    /// summary and the destination blob is never uploaded.
    #[error("{failed} of {total} files failed")]
    PartialCompletion { failed: usize, total: usize },
}

impl TranslateError {
    /// True for the error kinds that should never be retried by the message
    /// bus — nacking with `requeue = false` is correct for all of these,
    /// since none of them get better on redelivery (see spec.md §7).
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TranslateError::InputValidation(_)
                | TranslateError::PermanentDownstream(_)
                | TranslateError::InvalidTaskStateTransition { .. }
                | TranslateError::UnknownTask(_)
                | TranslateError::PartialCompletion { .. }
        )
    }
}
