use coercion_core::CoreError;
use coercion_domain::DomainError;
use thiserror::Error;

/// Errors surfaced by the Workstream façade. Thin wrapper over the engine's
/// own error taxonomy plus the façade-level operations that have no
/// engine-internal counterpart (double-start, unknown Plan id).
#[derive(Debug, Error)]
pub enum WorkstreamError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("plan {0} not found")]
    NotFound(String),

    #[error("plan {0} is already terminal; Start is a no-op on a terminal Plan")]
    AlreadyTerminal(String),

    #[error("plan {0} was never started")]
    NotStarted(String),
}
