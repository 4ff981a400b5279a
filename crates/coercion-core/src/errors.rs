use coercion_domain::DomainError;
use thiserror::Error;

/// Runtime/engine errors, as opposed to `DomainError`'s purely structural
/// validation errors. `CoreError` wraps `DomainError` via `#[from]` so a
/// runner can propagate either with a single `?`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("plan {0} not found")]
    PlanNotFound(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("plan was stopped by the user")]
    Stopped,
}

/// Errors surfaced by the Vault contract.
#[derive(Debug, Error, Clone)]
pub enum VaultError {
    #[error("plan {0} not found")]
    NotFound(String),

    #[error("optimistic concurrency conflict on {0}: expected etag {1}, found {2}")]
    EtagMismatch(String, String, String),

    #[error("transient vault error: {0}")]
    Transient(String),

    #[error("vault is closed")]
    Closed,
}

/// Coarse-grained error classification used by the Action Runner to decide
/// whether an error is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    TransientTransport,
    OptimisticConcurrencyConflict,
    PluginAttempt,
    PluginPermanent,
    Timeout,
    Cancellation,
    InternalInvariant,
}

pub fn classify_vault_error(e: &VaultError) -> ErrorClass {
    match e {
        VaultError::NotFound(_) => ErrorClass::Validation,
        VaultError::EtagMismatch(..) => ErrorClass::OptimisticConcurrencyConflict,
        VaultError::Transient(_) => ErrorClass::TransientTransport,
        VaultError::Closed => ErrorClass::TransientTransport,
    }
}
