use crate::cancel::Cancellation;
use crate::errors::CoreError;
use crate::registry::PluginRegistry;
use crate::runner::action::ActionRunner;
use crate::vault::Vault;
use chrono::Utc;
use coercion_domain::{Checks, Id, Status};

/// Runs every Action of a Checks set in parallel and joins. Used directly
/// for Bypass/Pre/Post/Deferred; [`run_continuous`] wraps this in the
/// re-run-until-cancelled-or-failed loop for Continuous Checks.
pub struct ChecksRunner<'a> {
    pub registry: &'a PluginRegistry,
    pub vault: &'a dyn Vault,
}

impl<'a> ChecksRunner<'a> {
    pub fn new(registry: &'a PluginRegistry, vault: &'a dyn Vault) -> Self {
        Self { registry, vault }
    }

    /// Runs one round. Returns `true` if every Action completed, `false` if
    /// any failed (including a cancelled Action's Stopped outcome, which
    /// counts as not-succeeded for the caller's gating decision).
    pub async fn run(&self, plan_id: &Id, checks: &mut Checks, cancellation: Cancellation) -> Result<bool, CoreError> {
        checks.state.mark_running(Utc::now())?;
        self.persist_checks(plan_id, checks).await?;

        let action_runner = ActionRunner::new(self.registry, self.vault);
        // Actions within a Checks set run in parallel and arbitrary order;
        // a plain `join_all` over per-Action futures is enough since the
        // pool-isolation concern only bites at the Block/Plan level where
        // children themselves spawn further pools.
        let mut futures = Vec::with_capacity(checks.actions.len());
        for action in &mut checks.actions {
            futures.push(action_runner.run(plan_id, action, cancellation.child()));
        }
        for result in futures::future::join_all(futures).await {
            result?;
        }

        let all_ok = checks.actions.iter().all(|a| a.state.status == Status::Completed);
        let terminal = if all_ok { Status::Completed } else { Status::Failed };
        checks.state.mark_terminal(terminal, Utc::now())?;
        self.persist_checks(plan_id, checks).await?;
        Ok(all_ok)
    }

    async fn persist_checks(&self, plan_id: &Id, checks: &mut Checks) -> Result<(), CoreError> {
        let expected = checks.state.etag.clone().unwrap_or_default();
        let new_etag = self.vault.update_checks(plan_id, &checks.id, checks.state.clone(), &expected).await?;
        checks.state.etag = Some(new_etag);
        Ok(())
    }
}

/// Drives Continuous Checks: re-run `checks` every `Delay` until either
/// `cancellation` fires (the normal shutdown path, once the guarded body has
/// finished) or a round fails, in which case `guard` is cancelled to cut
/// short the sibling work this Continuous Checks set gates, and the loop
/// returns.
pub async fn run_continuous(
    runner: &ChecksRunner<'_>,
    plan_id: &Id,
    checks: &mut Checks,
    cancellation: Cancellation,
    guard: Cancellation,
) -> Result<(), CoreError> {
    let delay_ms = checks.effective_delay_ms();
    loop {
        if cancellation.is_cancelled() {
            return Ok(());
        }
        let ok = runner.run(plan_id, checks, cancellation.child()).await?;
        if !ok {
            guard.cancel();
            return Ok(());
        }
        if delay_ms < 0 {
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(delay_ms as u64)) => {}
            _ = cancellation.cancelled() => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::InMemoryVault;
    use coercion_adapters::CheckPlugin;
    use coercion_domain::{Action, Block, Plan, Sequence};
    use std::sync::Arc;

    async fn seeded(checks: Checks) -> (InMemoryVault, Id, Checks) {
        let plan_id = checks.plan_id.clone();
        let mut block = Block::new(plan_id.clone(), "b", vec![Sequence::new(plan_id.clone(), "s", vec![])], 0);
        block.checks.pre = Some(checks);
        let mut plan = Plan::new("demo", vec![block]);
        plan.id = plan_id.clone();
        let vault = InMemoryVault::new();
        vault.create(plan).await.unwrap();
        let loaded = vault.read(&plan_id).await.unwrap();
        let checks = loaded.blocks[0].checks.pre.clone().unwrap();
        (vault, plan_id, checks)
    }

    #[tokio::test]
    async fn all_actions_succeed_completes() {
        let plan_id = Id::new();
        let checks = Checks::new(plan_id, vec![Action::new(Id::new(), "c1", "check", serde_json::json!({"arg": "planid"}))]);
        let (vault, plan_id, mut checks) = seeded(checks).await;
        let registry = PluginRegistry::new();
        registry.register(Arc::new(CheckPlugin::new("check"))).unwrap();
        let runner = ChecksRunner::new(&registry, &vault);
        let ok = runner.run(&plan_id, &mut checks, Cancellation::new()).await.unwrap();
        assert!(ok);
        assert_eq!(checks.state.status, Status::Completed);
    }

    #[tokio::test]
    async fn one_failing_action_fails_the_set() {
        let plan_id = Id::new();
        let checks = Checks::new(
            plan_id,
            vec![
                Action::new(Id::new(), "c1", "check", serde_json::json!({"arg": "planid"})),
                Action::new(Id::new(), "c2", "check", serde_json::json!({"arg": "error"})),
            ],
        );
        let (vault, plan_id, mut checks) = seeded(checks).await;
        let registry = PluginRegistry::new();
        registry.register(Arc::new(CheckPlugin::new("check"))).unwrap();
        let runner = ChecksRunner::new(&registry, &vault);
        let ok = runner.run(&plan_id, &mut checks, Cancellation::new()).await.unwrap();
        assert!(!ok);
        assert_eq!(checks.state.status, Status::Failed);
    }
}
