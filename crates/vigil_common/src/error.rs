//! Error taxonomy for the investigation engine.
//!
//! Nothing here is fatal. The worst outcome of any error is the investigation
//! being flagged for human escalation; `InvalidTransition` and
//! `CollaboratorFailure` surface to the caller as advisory messages, the rest
//! are recovered within the turn.

use thiserror::Error;

use crate::phase::Phase;

#[derive(Error, Debug)]
pub enum VigilError {
    /// A requested phase jump is not sanctioned by the catalog or the
    /// loop-back router. State is unchanged, the current phase is retained.
    #[error("invalid transition {from} -> {to}: {reason}")]
    InvalidTransition {
        from: Phase,
        to: Phase,
        reason: String,
    },

    /// The text-generation call errored or timed out. State is unchanged
    /// except the turn counter; the phase does not advance.
    #[error("collaborator failure: {0}")]
    CollaboratorFailure(String),

    /// Structured fields were absent or invalid. The turn degrades to the
    /// free-text answer and continues.
    #[error("malformed collaborator output: {0}")]
    MalformedOutput(String),

    /// The loop-back ceiling was hit. Non-fatal: progression is forced
    /// forward with a caveat recorded.
    #[error("loop-back ceiling reached, forcing forward progression")]
    LoopLimitExceeded,

    /// Optimistic concurrency check failed while persisting. Retryable:
    /// reload the case and resubmit.
    #[error("revision conflict for case {case_id}: expected {expected}, found {found}")]
    RevisionConflict {
        case_id: String,
        expected: u64,
        found: u64,
    },

    #[error("case not found: {0}")]
    CaseNotFound(String),

    /// A case with this id already exists; resume it by id instead.
    #[error("case already exists: {0}")]
    CaseExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VigilError {
    /// Whether the caller may retry the same submission after reloading state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VigilError::RevisionConflict { .. })
    }

    /// Whether the error is surfaced to the caller as an advisory message
    /// rather than handled silently inside the turn.
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            VigilError::InvalidTransition { .. } | VigilError::CollaboratorFailure(_)
        )
    }
}
