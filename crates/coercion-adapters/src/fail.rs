use async_trait::async_trait;
use coercion_core::registry::{ActionContext, Plugin};
use coercion_domain::PluginError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};

/// Always fails, permanently or not, depending on construction. Used to
/// exercise the Action Runner's permanent-vs-retryable split.
pub struct AlwaysFailPlugin {
    name: String,
    permanent: bool,
}

impl AlwaysFailPlugin {
    pub fn new(name: impl Into<String>, permanent: bool) -> Self {
        Self { name: name.into(), permanent }
    }
}

#[async_trait]
impl Plugin for AlwaysFailPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &ActionContext, _req: Value) -> Result<Value, PluginError> {
        Err(PluginError { message: "always fails".into(), permanent: self.permanent })
    }
}

/// Fails its first `fail_count` invocations (non-permanently), then succeeds.
/// Used to exercise the Action Runner's retry-until-success path.
pub struct FlakyPlugin {
    name: String,
    fail_count: u32,
    calls: AtomicU32,
}

impl FlakyPlugin {
    pub fn new(name: impl Into<String>, fail_count: u32) -> Self {
        Self { name: name.into(), fail_count, calls: AtomicU32::new(0) }
    }
}

#[async_trait]
impl Plugin for FlakyPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &ActionContext, _req: Value) -> Result<Value, PluginError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_count {
            Err(PluginError::transient(format!("flaky failure #{}", call + 1)))
        } else {
            Ok(json!({ "succeeded_on_call": call + 1 }))
        }
    }
}
