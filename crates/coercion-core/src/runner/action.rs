use crate::cancel::Cancellation;
use crate::errors::CoreError;
use crate::registry::{ActionContext, PluginRegistry};
use crate::vault::Vault;
use chrono::Utc;
use coercion_domain::{Action, Attempt, Id, PluginError, Status};
use std::time::Duration;

/// Drives one Action through `Start -> GetPlugin -> Execute -> End`.
/// Mutates `action` in place and persists every transition through the
/// Vault before proceeding, so a crash mid-Action always leaves a resumable
/// snapshot.
pub struct ActionRunner<'a> {
    pub registry: &'a PluginRegistry,
    pub vault: &'a dyn Vault,
}

impl<'a> ActionRunner<'a> {
    pub fn new(registry: &'a PluginRegistry, vault: &'a dyn Vault) -> Self {
        Self { registry, vault }
    }

    pub async fn run(&self, plan_id: &Id, action: &mut Action, cancellation: Cancellation) -> Result<(), CoreError> {
        let now = Utc::now();
        action.state.mark_running(now)?;
        self.persist(plan_id, action).await?;

        let Some(plugin) = self.registry.lookup(&action.plugin) else {
            let now = Utc::now();
            let mut attempt = Attempt::started(now);
            attempt.end = Some(now);
            attempt.err = Some(PluginError::permanent(format!("plugin '{}' is not registered", action.plugin)));
            action.push_attempt(attempt)?;
            action.state.mark_terminal(Status::Failed, Utc::now())?;
            self.persist(plan_id, action).await?;
            return Ok(());
        };

        let retry_policy = plugin.retry_policy();
        let max_attempts = (action.retries + 1).max(1);
        let mut outcome_failed = false;

        for attempt_idx in 0..max_attempts {
            if cancellation.is_cancelled() {
                action.state.mark_terminal(Status::Stopped, Utc::now())?;
                self.persist(plan_id, action).await?;
                return Ok(());
            }

            if attempt_idx > 0 {
                let delay = retry_policy.delay_for(attempt_idx - 1);
                if delay > Duration::ZERO {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancellation.cancelled() => {
                            action.state.mark_terminal(Status::Stopped, Utc::now())?;
                            self.persist(plan_id, action).await?;
                            return Ok(());
                        }
                    }
                }
            }

            let attempt_start = Utc::now();
            let ctx =
                ActionContext { plan_id: plan_id.clone(), action_id: action.id.clone(), action_name: action.name.clone(), cancellation: cancellation.clone() };
            let req = action.req.clone();
            let plugin_for_task = plugin.clone();
            // The plugin invocation runs in its own task so the Timeout is
            // enforced independently of the surrounding Stop cascade:
            // `tokio::time::timeout` here observes only the deadline, never
            // `cancellation`.
            let handle = tokio::spawn(async move { plugin_for_task.execute(&ctx, req).await });

            let mut attempt = Attempt::started(attempt_start);
            match tokio::time::timeout(Duration::from_millis(action.timeout_ms), handle).await {
                Ok(Ok(Ok(resp))) => {
                    if let Some(bad_field) = first_missing_field(&plugin.response_schema(), &resp) {
                        attempt.end = Some(Utc::now());
                        attempt.err = Some(PluginError::permanent(format!("response missing declared field '{}'", bad_field)));
                        action.push_attempt(attempt)?;
                        self.persist(plan_id, action).await?;
                        outcome_failed = true;
                        break;
                    }
                    attempt.end = Some(Utc::now());
                    attempt.resp = Some(resp);
                    action.push_attempt(attempt)?;
                    self.persist(plan_id, action).await?;
                    outcome_failed = false;
                    break;
                }
                Ok(Ok(Err(plugin_err))) => {
                    let permanent = plugin_err.permanent;
                    attempt.end = Some(Utc::now());
                    attempt.err = Some(plugin_err);
                    action.push_attempt(attempt)?;
                    self.persist(plan_id, action).await?;
                    if permanent {
                        outcome_failed = true;
                        break;
                    }
                    outcome_failed = true; // provisional; cleared on a later success
                }
                Ok(Err(join_err)) => {
                    attempt.end = Some(Utc::now());
                    attempt.err = Some(PluginError::permanent(format!("plugin task panicked: {}", join_err)));
                    action.push_attempt(attempt)?;
                    self.persist(plan_id, action).await?;
                    outcome_failed = true;
                    break;
                }
                Err(_elapsed) => {
                    attempt.end = Some(Utc::now());
                    attempt.err = Some(PluginError::transient("plugin execution timed out"));
                    action.push_attempt(attempt)?;
                    self.persist(plan_id, action).await?;
                    outcome_failed = true; // provisional; cleared on a later success
                }
            }
        }

        let terminal = if outcome_failed { Status::Failed } else { Status::Completed };
        action.state.mark_terminal(terminal, Utc::now())?;
        self.persist(plan_id, action).await?;
        Ok(())
    }

    async fn persist(&self, plan_id: &Id, action: &mut Action) -> Result<(), CoreError> {
        let expected = action.state.etag.clone().unwrap_or_default();
        let new_etag = self.vault.update_action(plan_id, &action.id, action.state.clone(), action.attempts.clone(), &expected).await?;
        action.state.etag = Some(new_etag);
        Ok(())
    }
}

/// Runtime-type check of a plugin's response against its declared schema:
/// every declared field must be present. An empty schema (the common case
/// for check-style plugins) accepts any response shape.
fn first_missing_field(schema: &coercion_policies::Schema, resp: &serde_json::Value) -> Option<String> {
    if schema.0.is_empty() {
        return None;
    }
    let obj = resp.as_object();
    schema.0.iter().find(|f| obj.map(|o| !o.contains_key(&f.name)).unwrap_or(true)).map(|f| f.name.clone())
}
