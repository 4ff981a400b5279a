use async_trait::async_trait;
use coercion_core::registry::{ActionContext, Plugin};
use coercion_domain::{Id, PluginError};
use serde_json::{json, Value};

/// A fake plugin for exercising Checks and gating logic in tests: with
/// `{"arg": "planid"}` it succeeds and returns a parseable time-ordered ID in
/// its response; with `{"arg": "error"}` it fails (non-permanent, so retry
/// policy still applies if the Action configured one).
pub struct CheckPlugin {
    name: String,
}

impl CheckPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Plugin for CheckPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ActionContext, req: Value) -> Result<Value, PluginError> {
        let arg = req.get("arg").and_then(Value::as_str).unwrap_or("");
        if arg == "error" {
            return Err(PluginError::transient("check failed"));
        }
        Ok(json!({ "id": Id::new().to_string(), "plan_id": ctx.plan_id.to_string() }))
    }

    fn is_check(&self) -> bool {
        true
    }
}
