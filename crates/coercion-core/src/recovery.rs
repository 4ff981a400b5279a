//! On-startup recovery: find Plans a prior crash left Running or Queued,
//! coerce their sub-object states back to a resumable baseline, and hand
//! them back to the [`crate::runner::plan::PlanExecutor`].

use crate::cancel::Cancellation;
use crate::errors::CoreError;
use crate::registry::PluginRegistry;
use crate::runner::plan::PlanExecutor;
use crate::vault::{Filters, Vault};
use chrono::Utc;
use coercion_domain::{Checks, Id, Plan, PluginError, Sequence, Status};

/// Plans recovered and handed back to the executor, for a caller that wants
/// to await them (the demo CLI; a production embedder would instead fire
/// these into its own task supervisor).
pub struct RecoveredPlan {
    pub plan_id: Id,
}

/// Scans the vault for non-terminal Plans within its retention window,
/// coerces their sub-object states, persists the coerced snapshot with fresh
/// ETags, then re-invokes the Plan Executor on each. Returns once every
/// recovered Plan has reached a terminal status.
pub async fn recover_all(registry: &PluginRegistry, vault: &dyn Vault) -> Result<Vec<RecoveredPlan>, CoreError> {
    let summaries = vault.search(Filters::by_status(vec![Status::Queued, Status::Running])).await?;
    let mut recovered = Vec::with_capacity(summaries.len());

    for summary in summaries {
        let mut plan = match vault.read(&summary.id).await {
            Ok(p) => p,
            Err(_) => continue, // outside retention by the time we got to it; leave it be
        };

        coerce_plan(&mut plan);
        persist_coerced(vault, &plan).await?;

        let executor = PlanExecutor::new(registry, vault);
        executor.run(&mut plan, Cancellation::new()).await?;
        recovered.push(RecoveredPlan { plan_id: plan.id.clone() });
    }

    Ok(recovered)
}

/// Walks a Plan tree and demotes Running entities to a consistent, resumable
/// baseline. Flags, but does not fix, any `Pos` discrepancy on a Block.
fn coerce_plan(plan: &mut Plan) {
    let now = Utc::now();

    for (block, derived_pos) in crate::vault::walk::blocks_with_derived_pos(plan) {
        if block.pos != derived_pos {
            tracing::warn!(plan = %plan.id, block = %block.id, stored_pos = block.pos, derived_pos, "recovery found a Pos discrepancy; left as-is");
        }
    }

    for block in &mut plan.blocks {
        coerce_checks_slot(&mut block.checks.bypass, now);
        coerce_checks_slot(&mut block.checks.pre, now);
        coerce_checks_slot(&mut block.checks.cont, now);
        coerce_checks_slot(&mut block.checks.post, now);
        coerce_checks_slot(&mut block.checks.deferred, now);
        for sequence in &mut block.sequences {
            coerce_sequence(sequence, now);
        }
        demote_to_baseline(&mut block.state.status, any_child_started_in_block(block));
    }

    coerce_checks_slot(&mut plan.checks.bypass, now);
    coerce_checks_slot(&mut plan.checks.pre, now);
    coerce_checks_slot(&mut plan.checks.cont, now);
    coerce_checks_slot(&mut plan.checks.post, now);
    coerce_checks_slot(&mut plan.checks.deferred, now);

    if plan.state.status == Status::Queued || plan.state.status == Status::Running {
        plan.state.status = Status::Queued;
    }
}

fn coerce_checks_slot(slot: &mut Option<Checks>, now: chrono::DateTime<Utc>) {
    let Some(checks) = slot.as_mut() else { return };
    let mut any_started = false;
    for action in &mut checks.actions {
        if action.state.status == Status::Running {
            let recovered = action.attempts.last().map(|a| a.end.is_none()).unwrap_or(false);
            if recovered {
                if let Some(attempt) = action.attempts.last_mut() {
                    attempt.end = Some(now);
                    attempt.err = Some(PluginError::transient("recovered"));
                }
            }
            action.state.status = Status::Stopped;
            action.state.end = Some(now);
        }
        if action.state.status != Status::NotStarted {
            any_started = true;
        }
    }
    demote_to_baseline(&mut checks.state.status, any_started);
}

fn coerce_sequence(sequence: &mut Sequence, now: chrono::DateTime<Utc>) {
    let mut any_started = false;
    for action in &mut sequence.actions {
        if action.state.status == Status::Running {
            let recovered = action.attempts.last().map(|a| a.end.is_none()).unwrap_or(false);
            if recovered {
                if let Some(attempt) = action.attempts.last_mut() {
                    attempt.end = Some(now);
                    attempt.err = Some(PluginError::transient("recovered"));
                }
            }
            action.state.status = Status::Stopped;
            action.state.end = Some(now);
        }
        if action.state.status != Status::NotStarted {
            any_started = true;
        }
    }
    demote_to_baseline(&mut sequence.state.status, any_started);
}

fn any_child_started_in_block(block: &coercion_domain::Block) -> bool {
    let slot_started = |c: &Option<Checks>| c.as_ref().map(|c| c.state.status != Status::NotStarted).unwrap_or(false);
    slot_started(&block.checks.bypass)
        || slot_started(&block.checks.pre)
        || slot_started(&block.checks.cont)
        || slot_started(&block.checks.post)
        || slot_started(&block.checks.deferred)
        || block.sequences.iter().any(|s| s.state.status != Status::NotStarted)
}

/// A Running entity with no started child goes back to NotStarted; one with
/// a started child stays Running so the executor resumes it in place.
/// Anything already terminal, or already NotStarted/Queued, is left
/// untouched.
fn demote_to_baseline(status: &mut Status, any_child_started: bool) {
    if *status == Status::Running {
        *status = if any_child_started { Status::Running } else { Status::NotStarted };
    }
}

async fn persist_coerced(vault: &dyn Vault, plan: &Plan) -> Result<(), CoreError> {
    for block in &plan.blocks {
        for checks in [&block.checks.bypass, &block.checks.pre, &block.checks.cont, &block.checks.post, &block.checks.deferred]
            .into_iter()
            .flatten()
        {
            persist_checks_coerced(vault, &plan.id, checks).await?;
        }
        for sequence in &block.sequences {
            let expected = sequence.state.etag.clone().unwrap_or_default();
            vault.update_sequence(&plan.id, &sequence.id, sequence.state.clone(), &expected).await?;
        }
        let expected = block.state.etag.clone().unwrap_or_default();
        vault.update_block(&plan.id, &block.id, block.state.clone(), &expected).await?;
    }
    for checks in [&plan.checks.bypass, &plan.checks.pre, &plan.checks.cont, &plan.checks.post, &plan.checks.deferred]
        .into_iter()
        .flatten()
    {
        persist_checks_coerced(vault, &plan.id, checks).await?;
    }
    let expected = plan.state.etag.clone().unwrap_or_default();
    vault.update_plan(&plan.id, plan.state.clone(), plan.reason, &expected).await?;
    Ok(())
}

async fn persist_checks_coerced(vault: &dyn Vault, plan_id: &Id, checks: &Checks) -> Result<(), CoreError> {
    for action in &checks.actions {
        let expected = action.state.etag.clone().unwrap_or_default();
        vault.update_action(plan_id, &action.id, action.state.clone(), action.attempts.clone(), &expected).await?;
    }
    let expected = checks.state.etag.clone().unwrap_or_default();
    vault.update_checks(plan_id, &checks.id, checks.state.clone(), &expected).await?;
    Ok(())
}
