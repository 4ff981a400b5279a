//! Thin demonstration binary for the coercion engine. Wires an in-memory
//! Vault, a couple of `coercion-adapters` plugins, and the Workstream façade
//! together, then submits and runs a small Plan with a PreCheck gate. The
//! engine itself exposes no CLI surface of its own; this is an embedding
//! program, not a component the engine ships.

use coercion_adapters::{CheckPlugin, SleepPlugin};
use coercion_core::{InMemoryVault, PluginRegistry, Vault};
use coercion_domain::{Action, Block, Checks, Id, Plan, Sequence};
use coercion_infra::{EngineConfig, Workstream};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let registry = Arc::new(PluginRegistry::new());
    registry.register(Arc::new(CheckPlugin::new("check"))).expect("register check plugin");
    registry.register(Arc::new(SleepPlugin::new("sleep"))).expect("register sleep plugin");

    let vault: Arc<dyn Vault> = Arc::new(InMemoryVault::new());
    let config = EngineConfig::from_env();
    let workstream = Workstream::new(registry, vault, config).await.expect("construct workstream");

    let plan = demo_plan();
    let plan_id = workstream.submit(plan).await.expect("submit plan");
    tracing::info!(plan = %plan_id, "submitted plan");

    workstream.start(&plan_id).await.expect("start plan");
    tracing::info!(plan = %plan_id, "started plan");

    let finished = workstream.wait(&plan_id, Duration::from_millis(25)).await.expect("wait for plan");
    println!("plan {} finished as {:?} ({:?})", finished.id, finished.state.status, finished.reason);
}

fn demo_plan() -> Plan {
    let plan_id = Id::new();

    let mut block = Block::new(plan_id.clone(), "main", vec![Sequence::new(plan_id.clone(), "work", vec![sleep_action(&plan_id, 10)])], 0);
    block.checks.pre = Some(Checks::new(plan_id.clone(), vec![check_action(&plan_id, "planid")]));

    Plan::new("demo", vec![block])
}

fn check_action(plan_id: &Id, arg: &str) -> Action {
    Action::new(plan_id.clone(), "check", "check", serde_json::json!({"arg": arg}))
}

fn sleep_action(plan_id: &Id, ms: u64) -> Action {
    Action::new(plan_id.clone(), "work", "sleep", serde_json::json!({"ms": ms}))
}
