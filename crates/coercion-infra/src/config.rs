//! Lazily-loaded engine-wide configuration, read once from the environment
//! (via a `.env` file if present). The in-memory vault needs no connection
//! pool, so this only carries the tunables that are genuinely engine-wide
//! rather than per-Plan.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

/// Forces early `.env` loading; harmless to call more than once.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default Action timeout when a Plan doesn't set one (the domain
    /// model's own `DEFAULT_ACTION_TIMEOUT_MS` is the floor this defers to).
    pub default_action_timeout_ms: u64,
    /// Default Block concurrency when a Plan doesn't set one.
    pub default_block_concurrency: u32,
    /// Default Continuous-Checks inter-round delay.
    pub default_continuous_delay_ms: i64,
    /// In-memory vault retention window, in days.
    pub vault_retention_days: i64,
    /// Whether to run crash recovery at engine construction. Exposed for
    /// test harnesses that want a clean vault with nothing to recover.
    pub recovery_enabled: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        init_dotenv();
        Self {
            default_action_timeout_ms: env_var("COERCION_DEFAULT_ACTION_TIMEOUT_MS", coercion_domain::entities::DEFAULT_ACTION_TIMEOUT_MS),
            default_block_concurrency: env_var("COERCION_DEFAULT_BLOCK_CONCURRENCY", 1),
            default_continuous_delay_ms: env_var("COERCION_DEFAULT_CONTINUOUS_DELAY_MS", coercion_domain::entities::DEFAULT_CONTINUOUS_DELAY_MS),
            vault_retention_days: env_var("COERCION_VAULT_RETENTION_DAYS", coercion_core::constants::DEFAULT_RETENTION_DAYS),
            recovery_enabled: env::var("COERCION_DISABLE_RECOVERY").is_err(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_action_timeout_ms: coercion_domain::entities::DEFAULT_ACTION_TIMEOUT_MS,
            default_block_concurrency: 1,
            default_continuous_delay_ms: coercion_domain::entities::DEFAULT_CONTINUOUS_DELAY_MS,
            vault_retention_days: coercion_core::constants::DEFAULT_RETENTION_DAYS,
            recovery_enabled: true,
        }
    }
}

fn env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_domain_constants_when_unset() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_action_timeout_ms, coercion_domain::entities::DEFAULT_ACTION_TIMEOUT_MS);
        assert!(cfg.recovery_enabled);
    }
}
