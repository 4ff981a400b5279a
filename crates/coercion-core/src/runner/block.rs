use crate::cancel::Cancellation;
use crate::errors::CoreError;
use crate::registry::PluginRegistry;
use crate::runner::checks::{run_continuous, ChecksRunner};
use crate::runner::sequence::SequenceRunner;
use crate::vault::Vault;
use chrono::Utc;
use coercion_domain::{Block, Id, Status};
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Drives one Block through its ten-step lifecycle: Bypass fast-path,
/// EntranceDelay, PreChecks, ContChecks running concurrently with the
/// bounded Sequence pool, PostChecks, DeferredChecks, ExitDelay.
pub struct BlockRunner<'a> {
    pub registry: &'a PluginRegistry,
    pub vault: &'a dyn Vault,
}

impl<'a> BlockRunner<'a> {
    pub fn new(registry: &'a PluginRegistry, vault: &'a dyn Vault) -> Self {
        Self { registry, vault }
    }

    pub async fn run(&self, plan_id: &Id, block: &mut Block, cancellation: Cancellation) -> Result<(), CoreError> {
        block.state.mark_running(Utc::now())?;
        self.persist_block(plan_id, block).await?;

        let checks_runner = ChecksRunner::new(self.registry, self.vault);

        // Step 1: Bypass fast-path.
        if let Some(bypass) = block.checks.bypass.as_mut() {
            let ok = checks_runner.run(plan_id, bypass, cancellation.child()).await?;
            if ok {
                block.state.mark_terminal(Status::Completed, Utc::now())?;
                self.persist_block(plan_id, block).await?;
                return Ok(());
            }
            tracing::info!(plan = %plan_id, block = %block.id, "block bypass failed, proceeding to body");
        }

        // Step 2: EntranceDelay.
        if block.entrance_delay_ms > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(block.entrance_delay_ms)) => {}
                _ = cancellation.cancelled() => {
                    block.state.mark_terminal(Status::Stopped, Utc::now())?;
                    self.persist_block(plan_id, block).await?;
                    return Ok(());
                }
            }
        }

        let mut pre_failed = false;
        let mut cont_failed = false;
        let mut block_over_budget = false;

        // Step 3: PreChecks.
        if let Some(pre) = block.checks.pre.as_mut() {
            let ok = checks_runner.run(plan_id, pre, cancellation.child()).await?;
            if !ok {
                pre_failed = true;
                tracing::warn!(plan = %plan_id, block = %block.id, "block PreChecks failed (FRPreCheck)");
            }
        }

        if !pre_failed && !cancellation.is_cancelled() {
            // Steps 4/5: ContChecks run concurrently with the Sequence pool.
            // `body_done` is the ContChecks loop's stop signal, cancelled once
            // the Sequence pool finishes; `worker_cancel` is what a failing
            // Continuous round (or a tolerated-failure overrun) cancels to cut
            // the Sequence pool short. Both are children of `cancellation`, so
            // a user Stop still reaches everything beneath this Block.
            let body_done = cancellation.child();
            let worker_cancel = cancellation.child();

            let sequences_fut = run_sequence_pool(
                self.registry,
                self.vault,
                plan_id,
                &mut block.sequences,
                block.concurrency,
                block.tolerated_failures,
                worker_cancel.clone(),
            );

            let (cont_result, failed_count) = if let Some(cont) = block.checks.cont.as_mut() {
                let cont_fut = run_continuous(&checks_runner, plan_id, cont, body_done.clone(), worker_cancel.clone());
                // `body_done` only ever gets cancelled here, once the pool
                // itself resolves; `run_continuous`'s loop is the only
                // listener, so this can never deadlock waiting on itself.
                let sequences_task = async {
                    let result = sequences_fut.await;
                    body_done.cancel();
                    result
                };
                let (cont_result, failed_count) = tokio::join!(cont_fut, sequences_task);
                (Some(cont_result), failed_count)
            } else {
                (None, sequences_fut.await)
            };

            if let Some(res) = cont_result {
                res?;
                if worker_cancel.is_cancelled() && !cancellation.is_cancelled() {
                    // worker_cancel was cancelled by us, either by ContChecks
                    // failing or by the tolerated-failure budget below; only
                    // the former is attributable to ContChecks specifically,
                    // and `block.checks.cont`'s own persisted Status already
                    // tells them apart, so we just check it here.
                    if block.checks.cont.as_ref().map(|c| c.state.status) == Some(Status::Failed) {
                        cont_failed = true;
                        tracing::warn!(plan = %plan_id, block = %block.id, "block ContChecks failed");
                    }
                }
            }

            let failed_count = failed_count?;
            if block.tolerated_failures >= 0 && failed_count > block.tolerated_failures as usize {
                block_over_budget = true;
                tracing::warn!(plan = %plan_id, block = %block.id, failed = failed_count, tolerated = block.tolerated_failures, "block sequences exceeded tolerated failures");
            }
        }

        // Step 7: PostChecks.
        let mut post_failed = false;
        if !pre_failed {
            if let Some(post) = block.checks.post.as_mut() {
                let ok = checks_runner.run(plan_id, post, cancellation.child()).await?;
                if !ok {
                    post_failed = true;
                    tracing::warn!(plan = %plan_id, block = %block.id, "block PostChecks failed");
                }
            }
        }

        // Step 8: DeferredChecks always run, on a detached context.
        if let Some(deferred) = block.checks.deferred.as_mut() {
            checks_runner.run(plan_id, deferred, Cancellation::detached()).await?;
        }

        // Step 9: ExitDelay.
        if block.exit_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(block.exit_delay_ms)).await;
        }

        // Step 10: terminal status.
        let any_failure = pre_failed || cont_failed || block_over_budget || post_failed;
        let terminal = if any_failure {
            Status::Failed
        } else if cancellation.is_cancelled() {
            Status::Stopped
        } else {
            Status::Completed
        };
        block.state.mark_terminal(terminal, Utc::now())?;
        self.persist_block(plan_id, block).await?;
        Ok(())
    }

    async fn persist_block(&self, plan_id: &Id, block: &mut Block) -> Result<(), CoreError> {
        let expected = block.state.etag.clone().unwrap_or_default();
        let new_etag = self.vault.update_block(plan_id, &block.id, block.state.clone(), &expected).await?;
        block.state.etag = Some(new_etag);
        Ok(())
    }
}

/// Runs `sequences` through a bounded worker pool of size `concurrency`.
/// Cancels `worker_cancel` once the number of failed Sequences exceeds
/// `tolerated_failures` (unless it is -1, meaning
/// "all tolerated"), which in turn cuts short both the remaining Sequences
/// and any sibling ContChecks round. Returns the number of failed Sequences.
async fn run_sequence_pool(
    registry: &PluginRegistry,
    vault: &dyn Vault,
    plan_id: &Id,
    sequences: &mut [coercion_domain::Sequence],
    concurrency: u32,
    tolerated_failures: i64,
    worker_cancel: Cancellation,
) -> Result<usize, CoreError> {
    let sequence_runner = SequenceRunner::new(registry, vault);
    let semaphore = Semaphore::new(concurrency.max(1) as usize);
    let mut failed = 0usize;

    let mut pool = FuturesUnordered::new();
    for sequence in sequences.iter_mut() {
        pool.push(async {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");
            sequence_runner.run(plan_id, sequence, worker_cancel.child()).await
        });
    }

    while let Some(result) = pool.next().await {
        if !result? {
            failed += 1;
            if tolerated_failures >= 0 && failed > tolerated_failures as usize {
                worker_cancel.cancel();
            }
        }
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::InMemoryVault;
    use coercion_adapters::{AlwaysFailPlugin, CheckPlugin};
    use coercion_domain::{Action, Checks, Plan, Sequence};
    use std::sync::Arc;

    async fn seeded(block: Block) -> (InMemoryVault, Id, Block) {
        let plan_id = block.plan_id.clone();
        let mut plan = Plan::new("demo", vec![block]);
        plan.id = plan_id.clone();
        let vault = InMemoryVault::new();
        vault.create(plan).await.unwrap();
        let loaded = vault.read(&plan_id).await.unwrap();
        let block = loaded.blocks[0].clone();
        (vault, plan_id, block)
    }

    fn check_action(plan_id: &Id, arg: &str) -> Action {
        Action::new(plan_id.clone(), "c", "check", serde_json::json!({"arg": arg}))
    }

    #[tokio::test]
    async fn bypass_success_completes_block_leaving_other_slots_not_started() {
        let plan_id = Id::new();
        let mut block = Block::new(plan_id.clone(), "b", vec![Sequence::new(plan_id.clone(), "s", vec![check_action(&plan_id, "planid")])], 0);
        block.checks.bypass = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));
        let (vault, plan_id, mut block) = seeded(block).await;
        let registry = PluginRegistry::new();
        registry.register(Arc::new(CheckPlugin::new("check"))).unwrap();
        let runner = BlockRunner::new(&registry, &vault);
        runner.run(&plan_id, &mut block, Cancellation::new()).await.unwrap();
        assert_eq!(block.state.status, Status::Completed);
        assert_eq!(block.sequences[0].state.status, Status::NotStarted);
    }

    #[tokio::test]
    async fn sequences_run_when_bypass_absent() {
        let plan_id = Id::new();
        let block = Block::new(plan_id.clone(), "b", vec![Sequence::new(plan_id.clone(), "s", vec![check_action(&plan_id, "planid")])], 0);
        let (vault, plan_id, mut block) = seeded(block).await;
        let registry = PluginRegistry::new();
        registry.register(Arc::new(CheckPlugin::new("check"))).unwrap();
        let runner = BlockRunner::new(&registry, &vault);
        runner.run(&plan_id, &mut block, Cancellation::new()).await.unwrap();
        assert_eq!(block.state.status, Status::Completed);
        assert_eq!(block.sequences[0].state.status, Status::Completed);
    }

    #[tokio::test]
    async fn tolerated_failures_exceeded_fails_block_and_cancels_rest() {
        let plan_id = Id::new();
        let mut block = Block::new(
            plan_id.clone(),
            "b",
            vec![
                Sequence::new(plan_id.clone(), "s1", vec![Action::new(plan_id.clone(), "a", "boom", serde_json::json!({}))]),
                Sequence::new(plan_id.clone(), "s2", vec![Action::new(plan_id.clone(), "a", "boom", serde_json::json!({}))]),
            ],
        );
        block.concurrency = 1;
        block.tolerated_failures = 0;
        let (vault, plan_id, mut block) = seeded(block).await;
        let registry = PluginRegistry::new();
        registry.register(Arc::new(AlwaysFailPlugin::new("boom", true))).unwrap();
        let runner = BlockRunner::new(&registry, &vault);
        runner.run(&plan_id, &mut block, Cancellation::new()).await.unwrap();
        assert_eq!(block.state.status, Status::Failed);
    }

    #[tokio::test]
    async fn pre_check_failure_skips_sequences_but_still_runs_deferred() {
        let plan_id = Id::new();
        let mut block = Block::new(plan_id.clone(), "b", vec![Sequence::new(plan_id.clone(), "s", vec![check_action(&plan_id, "planid")])], 0);
        block.checks.pre = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "error")]));
        block.checks.deferred = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));
        let (vault, plan_id, mut block) = seeded(block).await;
        let registry = PluginRegistry::new();
        registry.register(Arc::new(CheckPlugin::new("check"))).unwrap();
        let runner = BlockRunner::new(&registry, &vault);
        runner.run(&plan_id, &mut block, Cancellation::new()).await.unwrap();
        assert_eq!(block.state.status, Status::Failed);
        assert_eq!(block.sequences[0].state.status, Status::NotStarted);
        assert_eq!(block.checks.deferred.as_ref().unwrap().state.status, Status::Completed);
    }
}
