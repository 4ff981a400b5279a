use async_trait::async_trait;
use coercion_core::registry::{ActionContext, Plugin};
use coercion_domain::PluginError;
use serde_json::{json, Value};
use std::time::Duration;

/// Sleeps for `{"ms": n}` milliseconds and returns an empty response. Useful
/// both as a plain timed Action and, registered under fixed-duration names
/// like `quick`/`long`/`final`, as a stand-in workload for crash-recovery
/// tests that need an Action still mid-flight when the vault is snapshotted.
pub struct SleepPlugin {
    name: String,
}

impl SleepPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Plugin for SleepPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &ActionContext, req: Value) -> Result<Value, PluginError> {
        let ms = req.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    }

    fn is_check(&self) -> bool {
        false
    }
}
