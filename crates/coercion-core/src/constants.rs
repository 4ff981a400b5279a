/// Default transient-transport retry bound for the in-memory vault: retried
/// per the driver's exponential policy, capped at 5 attempts.
pub const VAULT_DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default retention window for the in-memory reference vault, in days,
/// matching a blob-oriented driver's default; a document-oriented driver
/// would instead be unbounded.
pub const DEFAULT_RETENTION_DAYS: i64 = 14;

pub fn default_retention() -> chrono::Duration {
    chrono::Duration::days(DEFAULT_RETENTION_DAYS)
}
