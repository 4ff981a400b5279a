//! Crate-level end-to-end scenarios driving the full Plan Executor against
//! an in-memory Vault and the `coercion-adapters` fake plugin set. Timings
//! are kept in the tens of milliseconds so the suite stays fast.

use coercion_adapters::{CheckPlugin, SleepPlugin};
use coercion_core::{Cancellation, InMemoryVault, PluginRegistry, PlanExecutor, Vault};
use coercion_domain::{Action, Block, Checks, FailureReason, Id, Plan, Sequence, Status};
use std::sync::Arc;

fn registry_with_check_and_sleep() -> PluginRegistry {
    let registry = PluginRegistry::new();
    registry.register(Arc::new(CheckPlugin::new("check"))).unwrap();
    registry.register(Arc::new(SleepPlugin::new("sleep"))).unwrap();
    registry
}

fn check_action(plan_id: &Id, arg: &str) -> Action {
    Action::new(plan_id.clone(), "check", "check", serde_json::json!({"arg": arg}))
}

fn sleep_action(plan_id: &Id, ms: u64) -> Action {
    Action::new(plan_id.clone(), "sleep", "sleep", serde_json::json!({"ms": ms}))
}

async fn run(plan: &mut Plan, vault: &InMemoryVault, registry: &PluginRegistry) {
    vault.create(plan.clone()).await.unwrap();
    let mut loaded = vault.read(&plan.id).await.unwrap();
    let executor = PlanExecutor::new(registry, vault);
    executor.run(&mut loaded, Cancellation::new()).await.unwrap();
    *plan = loaded;
}

/// PreChecks, one Block with four concurrent Sequences each running
/// `[sleep, check]`, PostChecks, ContChecks, DeferredChecks, all succeeding.
#[tokio::test]
async fn happy_path_completes_with_parseable_check_ids() {
    let plan_id = Id::new();
    let sequences: Vec<Sequence> =
        (0..4).map(|i| Sequence::new(plan_id.clone(), format!("seq-{i}"), vec![sleep_action(&plan_id, 5), check_action(&plan_id, "planid")])).collect();
    let mut block = Block::new(plan_id.clone(), "main", sequences, 0);
    block.concurrency = 2;
    block.checks.post = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));
    let mut cont = Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]);
    cont.delay_ms = Some(50); // longer than the body takes, so it runs exactly once
    block.checks.cont = Some(cont);
    block.checks.deferred = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));

    let mut plan = Plan::new("happy-path", vec![block]);
    plan.id = plan_id.clone();
    plan.checks.pre = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));

    let vault = InMemoryVault::new();
    let registry = registry_with_check_and_sleep();
    run(&mut plan, &vault, &registry).await;

    assert_eq!(plan.state.status, Status::Completed);
    assert_eq!(plan.reason, FailureReason::Unknown);
    for block in &plan.blocks {
        for checks in [&block.checks.pre, &block.checks.cont, &block.checks.post, &block.checks.deferred] {
            if let Some(checks) = checks {
                for action in &checks.actions {
                    let last = action.attempts.last().expect("attempt recorded");
                    let resp = last.resp.as_ref().expect("response recorded");
                    let id_str = resp.get("id").and_then(|v| v.as_str()).expect("parseable id field");
                    assert!(Id::from_raw(id_str).created_at().is_some(), "check response id must be time-ordered and parseable");
                }
            }
        }
    }
}

/// Plan-level BypassChecks succeeding leaves Pre/Post/Cont and every Block
/// NotStarted; Plan Completed.
#[tokio::test]
async fn plan_bypass_short_circuits_the_body() {
    let plan_id = Id::new();
    let block = Block::new(plan_id.clone(), "main", vec![Sequence::new(plan_id.clone(), "s", vec![check_action(&plan_id, "planid")])], 0);
    let mut plan = Plan::new("plan-bypass", vec![block]);
    plan.id = plan_id.clone();
    plan.checks.bypass = Some(Checks::new(plan_id.clone(), vec![sleep_action(&plan_id, 5), sleep_action(&plan_id, 5)]));
    plan.checks.pre = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));
    plan.checks.post = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));

    let vault = InMemoryVault::new();
    let registry = registry_with_check_and_sleep();
    run(&mut plan, &vault, &registry).await;

    assert_eq!(plan.state.status, Status::Completed);
    assert_eq!(plan.checks.pre.unwrap().state.status, Status::NotStarted);
    assert_eq!(plan.checks.post.unwrap().state.status, Status::NotStarted);
    assert_eq!(plan.blocks[0].state.status, Status::NotStarted);
}

/// One Block whose own Bypass succeeds (all its slots stay NotStarted, Block
/// Completed), a second whose Bypass fails and whose Sequences then run
/// normally and succeed; Plan Completed overall.
#[tokio::test]
async fn block_bypass_with_mixed_outcome() {
    let plan_id = Id::new();

    let mut block0 = Block::new(plan_id.clone(), "bypassed", vec![Sequence::new(plan_id.clone(), "s0", vec![check_action(&plan_id, "planid")])], 0);
    block0.checks.bypass = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));

    let mut block1 = Block::new(plan_id.clone(), "runs-body", vec![Sequence::new(plan_id.clone(), "s1", vec![check_action(&plan_id, "planid")])], 1);
    block1.checks.bypass = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "error")]));

    let mut plan = Plan::new("block-bypass", vec![block0, block1]);
    plan.id = plan_id.clone();

    let vault = InMemoryVault::new();
    let registry = registry_with_check_and_sleep();
    run(&mut plan, &vault, &registry).await;

    assert_eq!(plan.state.status, Status::Completed);
    assert_eq!(plan.blocks[0].state.status, Status::Completed);
    assert_eq!(plan.blocks[0].sequences[0].state.status, Status::NotStarted);
    assert_eq!(plan.blocks[1].state.status, Status::Completed);
    assert_eq!(plan.blocks[1].sequences[0].state.status, Status::Completed);
}

/// Plans inserted directly into the vault (a driver-level escape hatch, here
/// just constructing the Plan with its Status already Running and an Id
/// minted at a past instant) older than the retention window are invisible
/// to `read`/`search` but still visible to `read_direct`.
#[tokio::test]
async fn retention_boundary_hides_old_plans_from_read_and_search() {
    let vault = InMemoryVault::with_retention(chrono::Duration::days(14));

    let ages = [chrono::Duration::hours(1), chrono::Duration::days(2), chrono::Duration::days(13), chrono::Duration::days(14) + chrono::Duration::minutes(1)];
    let mut ids = Vec::new();
    for age in ages {
        let id = Id::at(chrono::Utc::now() - age);
        let mut plan = Plan::new("retention-boundary", vec![Block::new(id.clone(), "b", vec![], 0)]);
        plan.id = id.clone();
        plan.state.mark_running(chrono::Utc::now()).unwrap();
        vault.create(plan).await.unwrap();
        ids.push(id);
    }

    for id in &ids[..3] {
        assert!(vault.read(id).await.is_ok(), "within-retention plan must be readable");
    }
    assert!(vault.read(&ids[3]).await.is_err(), "past-retention plan must be hidden from read");
    assert!(vault.read_direct(&ids[3]).await.is_ok(), "past-retention plan must still be reachable via read_direct");

    let searched = vault.search(coercion_core::Filters::default()).await.unwrap();
    assert_eq!(searched.len(), 3, "search must exclude the past-retention plan");
}

/// A Block whose ContChecks fails on its first round cancels the running
/// Sequences; Block Failed, Plan Failed with reason Block.
#[tokio::test]
async fn continuous_check_failure_cancels_sequences_and_fails_the_plan() {
    let plan_id = Id::new();
    // Two actions per Sequence so cancellation (checked between Actions, not
    // mid-Action) has a chance to take effect before the Sequence finishes.
    let sequence = Sequence::new(plan_id.clone(), "s", vec![sleep_action(&plan_id, 50), sleep_action(&plan_id, 50)]);
    let mut block = Block::new(plan_id.clone(), "main", vec![sequence], 0);
    let mut cont = Checks::new(plan_id.clone(), vec![check_action(&plan_id, "error")]);
    cont.delay_ms = Some(1);
    block.checks.cont = Some(cont);

    let mut plan = Plan::new("cont-check-failure", vec![block]);
    plan.id = plan_id.clone();

    let vault = InMemoryVault::new();
    let registry = registry_with_check_and_sleep();
    run(&mut plan, &vault, &registry).await;

    assert_eq!(plan.blocks[0].state.status, Status::Failed);
    assert_eq!(plan.blocks[0].checks.cont.as_ref().unwrap().state.status, Status::Failed);
    assert_eq!(plan.blocks[0].sequences[0].state.status, Status::Stopped);
    assert_eq!(plan.state.status, Status::Failed);
    assert_eq!(plan.reason, FailureReason::Block);
}

/// Within a Block with Concurrency = k, at most k Sequences run
/// simultaneously. Measured via an atomic high-water mark inside a custom
/// plugin rather than timing, which would be flaky.
#[tokio::test]
async fn concurrency_bound_is_respected() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingPlugin {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl coercion_core::registry::Plugin for TrackingPlugin {
        fn name(&self) -> &str {
            "track"
        }

        async fn execute(&self, _ctx: &coercion_core::registry::ActionContext, _req: serde_json::Value) -> Result<serde_json::Value, coercion_domain::PluginError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::json!({}))
        }

        fn is_check(&self) -> bool {
            false
        }
    }

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let registry = PluginRegistry::new();
    registry.register(Arc::new(TrackingPlugin { running: running.clone(), peak: peak.clone() })).unwrap();

    let plan_id = Id::new();
    let action = |i: usize| Action::new(plan_id.clone(), format!("a{i}"), "track", serde_json::json!({}));
    let sequences: Vec<Sequence> = (0..6).map(|i| Sequence::new(plan_id.clone(), format!("seq-{i}"), vec![action(i)])).collect();
    let mut block = Block::new(plan_id.clone(), "main", sequences, 0);
    block.concurrency = 2;
    let mut plan = Plan::new("concurrency", vec![block]);
    plan.id = plan_id.clone();

    let vault = InMemoryVault::new();
    run(&mut plan, &vault, &registry).await;

    assert_eq!(plan.state.status, Status::Completed);
    assert!(peak.load(Ordering::SeqCst) <= 2, "observed concurrency {} exceeded bound 2", peak.load(Ordering::SeqCst));
}
