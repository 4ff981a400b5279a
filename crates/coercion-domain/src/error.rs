use crate::status::Status;
use thiserror::Error;

/// Validation and structural errors: malformed Plans, illegal state
/// transitions, and the kind of bug a single-writer-vault assumption is meant
/// to rule out. These never originate mid-execution; they are raised at
/// Submit/Register time or represent a programming error caught defensively.
#[derive(Debug, Error, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DomainError {
    #[error("plan name must not be empty")]
    EmptyPlanName,

    #[error("plan must contain at least one block")]
    NoBlocks,

    #[error("plugin '{0}' is not registered")]
    UnknownPlugin(String),

    #[error("action '{action}' rejected its request: {reason}")]
    InvalidActionRequest { action: String, reason: String },

    #[error("action timeout must be at least 5s (got {0}ms)")]
    TimeoutTooShort(u64),

    #[error("block concurrency must be at least 1 (got {0})")]
    InvalidConcurrency(i64),

    #[error("block tolerated_failures must be -1 (all) or >= 0 (got {0})")]
    InvalidToleratedFailures(i64),

    #[error("retry policy invalid: {0}")]
    InvalidRetryPolicy(String),

    #[error("plugin schema field '{field}' looks secret but is not marked secure")]
    UnmarkedSecretField { field: String },

    #[error("plugin name must not be empty")]
    EmptyPluginName,

    #[error("plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    #[error("illegal state transition from {from:?} to {to:?}")]
    IllegalTransition { from: Status, to: Status },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Serialization(e.to_string())
    }
}
