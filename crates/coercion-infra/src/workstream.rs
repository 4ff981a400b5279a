//! The Workstream façade: `Submit` / `Start` / `Status` / `Wait` / `Stop`,
//! owning engine lifecycle. Plugin registration happens before
//! construction, crash recovery happens at construction, and every Plan
//! started afterwards runs as a background task tracked by a cancellation
//! token so `Stop` has something to cancel.

use crate::config::EngineConfig;
use crate::error::WorkstreamError;
use coercion_core::{recover_all, Cancellation, CoreError, Plugin, PluginRegistry, PlanExecutor, Vault, VaultError};
use coercion_domain::{CheckSlots, Id, Plan, Status};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct Workstream {
    registry: Arc<PluginRegistry>,
    vault: Arc<dyn Vault>,
    config: EngineConfig,
    running: Arc<DashMap<Id, Cancellation>>,
}

impl Workstream {
    /// Constructs the façade and, unless `config.recovery_enabled` is false,
    /// immediately runs crash recovery against `vault` before accepting any
    /// new work.
    pub async fn new(registry: Arc<PluginRegistry>, vault: Arc<dyn Vault>, config: EngineConfig) -> Result<Self, WorkstreamError> {
        let workstream = Self { registry, vault, config, running: Arc::new(DashMap::new()) };
        if workstream.config.recovery_enabled {
            let recovered = recover_all(&workstream.registry, workstream.vault.as_ref()).await?;
            for r in recovered {
                tracing::info!(plan = %r.plan_id, "recovered plan resumed to a terminal status at startup");
            }
        }
        Ok(workstream)
    }

    /// Validates `plan` (structural invariants, plugin existence,
    /// `ValidateReq` for every Action) and persists it as NotStarted. IDs and
    /// `SubmitTime` are already stamped by the domain constructors
    /// (`Plan::new` et al.), since `Id` has no uninitialized state to fill in
    /// later.
    pub async fn submit(&self, plan: Plan) -> Result<Id, WorkstreamError> {
        plan.validate()?;
        validate_against_registry(&plan, &self.registry)?;
        let plan_id = plan.id.clone();
        self.vault.create(plan).await.map_err(CoreError::from)?;
        Ok(plan_id)
    }

    /// NotStarted -> Queued, then dispatches the Plan Executor in the
    /// background. A no-op on an already-Running Plan (idempotent across
    /// recovery); rejected on a terminal Plan.
    pub async fn start(&self, plan_id: &Id) -> Result<(), WorkstreamError> {
        let mut plan = self.read(plan_id).await?;
        match plan.state.status {
            Status::Queued | Status::Running => return Ok(()),
            s if s.is_terminal() => return Err(WorkstreamError::AlreadyTerminal(plan_id.to_string())),
            _ => {}
        }

        plan.state.mark_queued()?;
        self.persist_plan_state(&mut plan).await?;

        let cancellation = Cancellation::new();
        self.running.insert(plan_id.clone(), cancellation.clone());

        let registry = self.registry.clone();
        let vault = self.vault.clone();
        let running = self.running.clone();
        let pid = plan_id.clone();
        tokio::spawn(async move {
            let mut plan = match vault.read(&pid).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(plan = %pid, error = %e, "could not reload plan to start executor");
                    running.remove(&pid);
                    return;
                }
            };
            let executor = PlanExecutor::new(&registry, vault.as_ref());
            if let Err(e) = executor.run(&mut plan, cancellation).await {
                tracing::error!(plan = %pid, error = %e, "plan executor returned an error");
            }
            running.remove(&pid);
        });

        Ok(())
    }

    pub async fn status(&self, plan_id: &Id) -> Result<Plan, WorkstreamError> {
        self.read(plan_id).await
    }

    /// Polls `Status` at `poll_interval` until the Plan reaches a terminal
    /// status, then returns it.
    pub async fn wait(&self, plan_id: &Id, poll_interval: Duration) -> Result<Plan, WorkstreamError> {
        loop {
            let plan = self.status(plan_id).await?;
            if plan.state.status.is_terminal() {
                return Ok(plan);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Best-effort cooperative cancel. A no-op if the Plan isn't currently
    /// running under this façade (already terminal, or on another engine
    /// instance).
    pub fn stop(&self, plan_id: &Id) {
        if let Some(cancellation) = self.running.get(plan_id) {
            cancellation.cancel();
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn read(&self, plan_id: &Id) -> Result<Plan, WorkstreamError> {
        self.vault.read(plan_id).await.map_err(|e| match e {
            VaultError::NotFound(id) => WorkstreamError::NotFound(id),
            other => WorkstreamError::Core(CoreError::from(other)),
        })
    }

    async fn persist_plan_state(&self, plan: &mut Plan) -> Result<(), WorkstreamError> {
        let expected = plan.state.etag.clone().unwrap_or_default();
        let new_etag = self.vault.update_plan(&plan.id, plan.state.clone(), plan.reason, &expected).await.map_err(CoreError::from)?;
        plan.state.etag = Some(new_etag);
        Ok(())
    }
}

/// Submit-time plugin existence and `ValidateReq` checks: the part of Plan
/// validation that needs the registry and so can't live on `Plan` itself
/// (`coercion-domain` has no dependency on `coercion-core`).
fn validate_against_registry(plan: &Plan, registry: &PluginRegistry) -> Result<(), coercion_domain::DomainError> {
    for slot in checks_slots(&plan.checks) {
        for action in &slot.actions {
            check_action(action, registry)?;
        }
    }
    for block in &plan.blocks {
        for slot in checks_slots(&block.checks) {
            for action in &slot.actions {
                check_action(action, registry)?;
            }
        }
        for sequence in &block.sequences {
            for action in &sequence.actions {
                check_action(action, registry)?;
            }
        }
    }
    Ok(())
}

fn checks_slots(slots: &CheckSlots) -> impl Iterator<Item = &coercion_domain::Checks> {
    [&slots.bypass, &slots.pre, &slots.cont, &slots.post, &slots.deferred].into_iter().flatten()
}

fn check_action(action: &coercion_domain::Action, registry: &PluginRegistry) -> Result<(), coercion_domain::DomainError> {
    let plugin = registry.lookup(&action.plugin).ok_or_else(|| coercion_domain::DomainError::UnknownPlugin(action.plugin.clone()))?;
    plugin.validate_req(&action.req).map_err(|e| coercion_domain::DomainError::InvalidActionRequest { action: action.name.clone(), reason: e.message })?;
    Ok(())
}
