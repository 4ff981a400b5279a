use crate::cancel::Cancellation;
use coercion_domain::{DomainError, Id, PluginError};
use coercion_policies::{RetryPolicy, Schema};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// What a plugin invocation is given to work with. `cancellation` lets a
/// cooperative plugin observe the same signal the Action Runner
/// enforces via `tokio::time::timeout`; responsiveness to it is advisory,
/// never load-bearing, since the runner's own timeout is authoritative.
#[derive(Clone)]
pub struct ActionContext {
    pub plan_id: Id,
    pub action_id: Id,
    pub action_name: String,
    pub cancellation: Cancellation,
}

/// The minimal plugin contract. Implementations live in
/// `coercion-adapters` or in an embedding program; this crate only defines
/// the trait and the registry that looks plugins up by name.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &ActionContext, req: serde_json::Value) -> Result<serde_json::Value, PluginError>;

    /// Request-shape validation ahead of execution (every Action is checked
    /// against this at submit time). Default accepts anything.
    fn validate_req(&self, _req: &serde_json::Value) -> Result<(), PluginError> {
        Ok(())
    }

    fn request_schema(&self) -> Schema {
        Schema::empty()
    }

    fn response_schema(&self) -> Schema {
        Schema::empty()
    }

    /// Whether this plugin may be used as a Checks Action.
    fn is_check(&self) -> bool {
        true
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// One-shot setup, run once at registration.
    fn init(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Name -> Plugin lookup. `Register` is one-shot, run at engine
/// initialization and not intended for concurrent callers; `Lookup` is safe
/// to call concurrently from every running Plan's tasks.
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { plugins: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), DomainError> {
        let name = plugin.name().to_string();
        if name.is_empty() {
            return Err(DomainError::EmptyPluginName);
        }
        {
            let plugins = self.plugins.read().expect("registry lock poisoned");
            if plugins.contains_key(&name) {
                return Err(DomainError::DuplicatePlugin(name));
            }
        }
        plugin.retry_policy().validate()?;
        if let Some(field) = plugin.request_schema().first_unmarked_secret() {
            return Err(DomainError::UnmarkedSecretField { field: field.to_string() });
        }
        if let Some(field) = plugin.response_schema().first_unmarked_secret() {
            return Err(DomainError::UnmarkedSecretField { field: field.to_string() });
        }
        let mut plugins = self.plugins.write().expect("registry lock poisoned");
        plugins.insert(name, plugin);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().expect("registry lock poisoned").get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.plugins.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
