use crate::cancel::Cancellation;
use crate::errors::CoreError;
use crate::registry::PluginRegistry;
use crate::runner::block::BlockRunner;
use crate::runner::checks::{run_continuous, ChecksRunner};
use crate::vault::Vault;
use chrono::Utc;
use coercion_domain::{FailureReason, Id, Plan, Status};

/// Top-level state machine: mirrors the Block lifecycle one level up, over
/// the Plan's own five Checks slots and its strictly-serial Blocks.
pub struct PlanExecutor<'a> {
    pub registry: &'a PluginRegistry,
    pub vault: &'a dyn Vault,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(registry: &'a PluginRegistry, vault: &'a dyn Vault) -> Self {
        Self { registry, vault }
    }

    pub async fn run(&self, plan: &mut Plan, cancellation: Cancellation) -> Result<(), CoreError> {
        plan.state.mark_running(Utc::now())?;
        self.persist_plan(plan).await?;

        let checks_runner = ChecksRunner::new(self.registry, self.vault);

        if let Some(bypass) = plan.checks.bypass.as_mut() {
            let ok = checks_runner.run(&plan.id, bypass, cancellation.child()).await?;
            if ok {
                plan.state.mark_terminal(Status::Completed, Utc::now())?;
                plan.reason = FailureReason::Unknown;
                self.persist_plan(plan).await?;
                return Ok(());
            }
            tracing::info!(plan = %plan.id, "plan bypass failed, proceeding to body");
        }

        if let Some(pre) = plan.checks.pre.as_mut() {
            let ok = checks_runner.run(&plan.id, pre, cancellation.child()).await?;
            if !ok {
                tracing::warn!(plan = %plan.id, "plan PreChecks failed");
            }
        }

        let body_done = cancellation.child();
        let block_cancel = cancellation.child();

        let blocks_fut = run_blocks_serially(self.registry, self.vault, &plan.id, &mut plan.blocks, block_cancel.clone());

        if let Some(cont) = plan.checks.cont.as_mut() {
            let cont_fut = run_continuous(&checks_runner, &plan.id, cont, body_done.clone(), block_cancel.clone());
            let blocks_task = async {
                let result = blocks_fut.await;
                body_done.cancel();
                result
            };
            let (cont_result, blocks_result) = tokio::join!(cont_fut, blocks_task);
            cont_result?;
            blocks_result?;
        } else {
            blocks_fut.await?;
        }

        if let Some(post) = plan.checks.post.as_mut() {
            let ok = checks_runner.run(&plan.id, post, cancellation.child()).await?;
            if !ok {
                tracing::warn!(plan = %plan.id, "plan PostChecks failed");
            }
        }

        // DeferredChecks always run, on a detached context, even if the user
        // Stopped the Plan; they are skipped entirely only when the Plan
        // never reached its body, which cannot happen here since we always
        // fall through to this point.
        if let Some(deferred) = plan.checks.deferred.as_mut() {
            checks_runner.run(&plan.id, deferred, Cancellation::detached()).await?;
        }

        let (terminal, reason) = final_state(plan, cancellation.is_cancelled())?;
        plan.reason = reason;
        plan.state.mark_terminal(terminal, Utc::now())?;
        self.persist_plan(plan).await?;
        Ok(())
    }

    async fn persist_plan(&self, plan: &mut Plan) -> Result<(), CoreError> {
        let expected = plan.state.etag.clone().unwrap_or_default();
        let new_etag = self.vault.update_plan(&plan.id, plan.state.clone(), plan.reason, &expected).await?;
        plan.state.etag = Some(new_etag);
        Ok(())
    }
}

async fn run_blocks_serially(
    registry: &PluginRegistry,
    vault: &dyn Vault,
    plan_id: &Id,
    blocks: &mut [coercion_domain::Block],
    cancellation: Cancellation,
) -> Result<(), CoreError> {
    let block_runner = BlockRunner::new(registry, vault);
    for block in blocks.iter_mut() {
        if cancellation.is_cancelled() {
            break;
        }
        block_runner.run(plan_id, block, cancellation.child()).await?;
        if block.state.status == Status::Failed && !cancellation.is_cancelled() {
            // A failed Block still finishes the serial chain's remaining
            // Blocks as NotStarted rather than running them, mirroring a
            // Sequence's skip-on-failure one level up.
            break;
        }
    }
    Ok(())
}

/// Computes the Plan's terminal Status and FailureReason. A Check found
/// Running here is an internal-invariant bug.
fn final_state(plan: &Plan, user_stopped: bool) -> Result<(Status, FailureReason), CoreError> {
    if user_stopped {
        return Ok((Status::Stopped, FailureReason::Stopped));
    }

    if let Some(bypass) = &plan.checks.bypass {
        if bypass.state.status == Status::Completed {
            return Ok((Status::Completed, FailureReason::Unknown));
        }
    }

    for (checks, reason) in [
        (&plan.checks.pre, FailureReason::PreCheck),
        (&plan.checks.cont, FailureReason::ContCheck),
        (&plan.checks.post, FailureReason::PostCheck),
        (&plan.checks.deferred, FailureReason::DeferredCheck),
    ] {
        if let Some(c) = checks {
            match c.state.status {
                Status::Completed => {}
                Status::Running => {
                    return Err(CoreError::Internal(format!("plan {} has a Check still Running at final-state evaluation", plan.id)));
                }
                _ => return Ok((Status::Failed, reason)),
            }
        }
    }

    if plan.blocks.iter().any(|b| b.state.status != Status::Completed) {
        if plan.blocks.iter().any(|b| b.state.status == Status::Running) {
            return Err(CoreError::Internal(format!("plan {} has a Block still Running at final-state evaluation", plan.id)));
        }
        return Ok((Status::Failed, FailureReason::Block));
    }

    Ok((Status::Completed, FailureReason::Unknown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::InMemoryVault;
    use coercion_adapters::CheckPlugin;
    use coercion_domain::{Action, Block, Checks, Sequence};
    use std::sync::Arc;

    fn check_action(plan_id: &Id, arg: &str) -> Action {
        Action::new(plan_id.clone(), "c", "check", serde_json::json!({"arg": arg}))
    }

    async fn registry_with_check() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(CheckPlugin::new("check"))).unwrap();
        registry
    }

    #[tokio::test]
    async fn happy_path_plan_completes() {
        let plan_id = Id::new();
        let block = Block::new(plan_id.clone(), "b", vec![Sequence::new(plan_id.clone(), "s", vec![check_action(&plan_id, "planid")])], 0);
        let mut plan = Plan::new("demo", vec![block]);
        plan.id = plan_id.clone();
        let vault = InMemoryVault::new();
        vault.create(plan.clone()).await.unwrap();
        let mut loaded = vault.read(&plan_id).await.unwrap();
        let registry = registry_with_check().await;
        let executor = PlanExecutor::new(&registry, &vault);
        executor.run(&mut loaded, Cancellation::new()).await.unwrap();
        assert_eq!(loaded.state.status, Status::Completed);
        assert_eq!(loaded.reason, FailureReason::Unknown);
    }

    #[tokio::test]
    async fn plan_bypass_leaves_blocks_not_started() {
        let plan_id = Id::new();
        let block = Block::new(plan_id.clone(), "b", vec![Sequence::new(plan_id.clone(), "s", vec![check_action(&plan_id, "planid")])], 0);
        let mut plan = Plan::new("demo", vec![block]);
        plan.id = plan_id.clone();
        plan.checks.bypass = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));
        let vault = InMemoryVault::new();
        vault.create(plan.clone()).await.unwrap();
        let mut loaded = vault.read(&plan_id).await.unwrap();
        let registry = registry_with_check().await;
        let executor = PlanExecutor::new(&registry, &vault);
        executor.run(&mut loaded, Cancellation::new()).await.unwrap();
        assert_eq!(loaded.state.status, Status::Completed);
        assert_eq!(loaded.blocks[0].state.status, Status::NotStarted);
    }

    #[tokio::test]
    async fn failed_block_fails_plan_with_block_reason() {
        let plan_id = Id::new();
        let block = Block::new(plan_id.clone(), "b", vec![Sequence::new(plan_id.clone(), "s", vec![check_action(&plan_id, "error")])], 0);
        let mut plan = Plan::new("demo", vec![block]);
        plan.id = plan_id.clone();
        let vault = InMemoryVault::new();
        vault.create(plan.clone()).await.unwrap();
        let mut loaded = vault.read(&plan_id).await.unwrap();
        let registry = registry_with_check().await;
        let executor = PlanExecutor::new(&registry, &vault);
        executor.run(&mut loaded, Cancellation::new()).await.unwrap();
        assert_eq!(loaded.state.status, Status::Failed);
        assert_eq!(loaded.reason, FailureReason::Block);
    }
}
