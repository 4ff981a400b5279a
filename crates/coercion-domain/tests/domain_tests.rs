use coercion_domain::{Action, Block, CheckSlots, Checks, DomainError, Plan, Sequence};
use serde_json::json;

fn sample_plan() -> Plan {
    let pid = coercion_domain::Id::new();
    let action = Action::new(pid.clone(), "check", "check", json!({}));
    let seq = Sequence::new(pid.clone(), "seq-0", vec![action]);
    let block = Block::new(pid, "block-0", vec![seq], 0);
    Plan::new("demo", vec![block])
}

#[test]
fn plan_requires_a_name() {
    let mut plan = sample_plan();
    plan.name = "   ".into();
    assert_eq!(plan.validate(), Err(DomainError::EmptyPlanName));
}

#[test]
fn plan_requires_at_least_one_block() {
    let mut plan = sample_plan();
    plan.blocks.clear();
    assert_eq!(plan.validate(), Err(DomainError::NoBlocks));
}

#[test]
fn checks_with_no_actions_normalize_to_absent() {
    let pid = coercion_domain::Id::new();
    let slots = CheckSlots { bypass: Some(Checks::new(pid, vec![])), ..Default::default() }.normalize();
    assert!(slots.bypass.is_none());
}

#[test]
fn block_rejects_zero_concurrency() {
    let mut plan = sample_plan();
    plan.blocks[0].concurrency = 0;
    assert_eq!(plan.validate(), Err(DomainError::InvalidConcurrency(0)));
}

#[test]
fn block_rejects_tolerated_failures_below_minus_one() {
    let mut plan = sample_plan();
    plan.blocks[0].tolerated_failures = -2;
    assert_eq!(plan.validate(), Err(DomainError::InvalidToleratedFailures(-2)));
}

#[test]
fn action_attempts_reject_backwards_timestamps() {
    let pid = coercion_domain::Id::new();
    let mut action = Action::new(pid, "a", "p", json!({}));
    let now = chrono::Utc::now();
    action.push_attempt(coercion_domain::Attempt::started(now)).unwrap();
    let earlier = now - chrono::Duration::seconds(5);
    let err = action.push_attempt(coercion_domain::Attempt::started(earlier));
    assert!(err.is_err());
}
