use super::{Filters, PlanSummary, Vault};
use crate::constants::default_retention;
use crate::errors::VaultError;
use async_trait::async_trait;
use chrono::Utc;
use coercion_domain::{Attempt, FailureReason, Id, Plan, State, Status};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory reference implementation of the Vault contract. Keyed off the
/// ID's embedded creation timestamp for retention, so it behaves the same
/// way a real blob-backed driver would.
pub struct InMemoryVault {
    plans: RwLock<HashMap<Id, Plan>>,
    retention: chrono::Duration,
    closed: std::sync::atomic::AtomicBool,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self { plans: RwLock::new(HashMap::new()), retention: default_retention(), closed: std::sync::atomic::AtomicBool::new(false) }
    }

    pub fn with_retention(retention: chrono::Duration) -> Self {
        Self { plans: RwLock::new(HashMap::new()), retention, closed: std::sync::atomic::AtomicBool::new(false) }
    }

    fn check_open(&self) -> Result<(), VaultError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(VaultError::Closed);
        }
        Ok(())
    }

    fn within_retention(&self, plan_id: &Id) -> bool {
        match plan_id.created_at() {
            Some(created) => Utc::now() - created <= self.retention,
            None => true,
        }
    }

    fn summarize(plan: &Plan) -> PlanSummary {
        PlanSummary {
            id: plan.id.clone(),
            name: plan.name.clone(),
            group_id: plan.group_id.clone(),
            status: plan.state.status,
            submit_time: plan.submit_time,
        }
    }
}

impl Default for InMemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh_etag() -> String {
    Id::new().to_string()
}

/// Stamps a fresh ETag on every entity in the tree (used at `Create`).
fn mint_etags(plan: &mut Plan) {
    plan.state.etag = Some(fresh_etag());
    let mint_checks = |c: &mut Option<coercion_domain::Checks>| {
        if let Some(c) = c {
            c.state.etag = Some(fresh_etag());
            for a in &mut c.actions {
                a.state.etag = Some(fresh_etag());
            }
        }
    };
    mint_checks(&mut plan.checks.bypass);
    mint_checks(&mut plan.checks.pre);
    mint_checks(&mut plan.checks.cont);
    mint_checks(&mut plan.checks.post);
    mint_checks(&mut plan.checks.deferred);
    for block in &mut plan.blocks {
        block.state.etag = Some(fresh_etag());
        mint_checks(&mut block.checks.bypass);
        mint_checks(&mut block.checks.pre);
        mint_checks(&mut block.checks.cont);
        mint_checks(&mut block.checks.post);
        mint_checks(&mut block.checks.deferred);
        for seq in &mut block.sequences {
            seq.state.etag = Some(fresh_etag());
            for a in &mut seq.actions {
                a.state.etag = Some(fresh_etag());
            }
        }
    }
}

#[async_trait]
impl Vault for InMemoryVault {
    async fn create(&self, mut plan: Plan) -> Result<String, VaultError> {
        self.check_open()?;
        mint_etags(&mut plan);
        let etag = plan.state.etag.clone().expect("just minted");
        let mut plans = self.plans.write().await;
        plans.insert(plan.id.clone(), plan);
        Ok(etag)
    }

    async fn read(&self, plan_id: &Id) -> Result<Plan, VaultError> {
        self.check_open()?;
        if !self.within_retention(plan_id) {
            return Err(VaultError::NotFound(plan_id.to_string()));
        }
        self.read_direct(plan_id).await
    }

    async fn read_direct(&self, plan_id: &Id) -> Result<Plan, VaultError> {
        self.check_open()?;
        let plans = self.plans.read().await;
        plans.get(plan_id).cloned().ok_or_else(|| VaultError::NotFound(plan_id.to_string()))
    }

    async fn update_plan(&self, plan_id: &Id, state: State, reason: FailureReason, expected_etag: &str) -> Result<String, VaultError> {
        self.check_open()?;
        let mut plans = self.plans.write().await;
        let plan = plans.get_mut(plan_id).ok_or_else(|| VaultError::NotFound(plan_id.to_string()))?;
        let current = plan.state.etag.clone().unwrap_or_default();
        if current != expected_etag {
            return Err(VaultError::EtagMismatch(plan_id.to_string(), expected_etag.to_string(), current));
        }
        let new_etag = fresh_etag();
        plan.state = state;
        plan.state.etag = Some(new_etag.clone());
        plan.reason = reason;
        Ok(new_etag)
    }

    async fn update_block(&self, plan_id: &Id, block_id: &Id, state: State, expected_etag: &str) -> Result<String, VaultError> {
        self.check_open()?;
        let mut plans = self.plans.write().await;
        let plan = plans.get_mut(plan_id).ok_or_else(|| VaultError::NotFound(plan_id.to_string()))?;
        let block = super::walk::find_block_mut(plan, block_id).ok_or_else(|| VaultError::NotFound(block_id.to_string()))?;
        let current = block.state.etag.clone().unwrap_or_default();
        if current != expected_etag {
            return Err(VaultError::EtagMismatch(block_id.to_string(), expected_etag.to_string(), current));
        }
        let new_etag = fresh_etag();
        block.state = state;
        block.state.etag = Some(new_etag.clone());
        Ok(new_etag)
    }

    async fn update_checks(&self, plan_id: &Id, checks_id: &Id, state: State, expected_etag: &str) -> Result<String, VaultError> {
        self.check_open()?;
        let mut plans = self.plans.write().await;
        let plan = plans.get_mut(plan_id).ok_or_else(|| VaultError::NotFound(plan_id.to_string()))?;
        let checks = super::walk::find_checks_mut(plan, checks_id).ok_or_else(|| VaultError::NotFound(checks_id.to_string()))?;
        let current = checks.state.etag.clone().unwrap_or_default();
        if current != expected_etag {
            return Err(VaultError::EtagMismatch(checks_id.to_string(), expected_etag.to_string(), current));
        }
        let new_etag = fresh_etag();
        checks.state = state;
        checks.state.etag = Some(new_etag.clone());
        Ok(new_etag)
    }

    async fn update_sequence(&self, plan_id: &Id, sequence_id: &Id, state: State, expected_etag: &str) -> Result<String, VaultError> {
        self.check_open()?;
        let mut plans = self.plans.write().await;
        let plan = plans.get_mut(plan_id).ok_or_else(|| VaultError::NotFound(plan_id.to_string()))?;
        let seq = super::walk::find_sequence_mut(plan, sequence_id).ok_or_else(|| VaultError::NotFound(sequence_id.to_string()))?;
        let current = seq.state.etag.clone().unwrap_or_default();
        if current != expected_etag {
            return Err(VaultError::EtagMismatch(sequence_id.to_string(), expected_etag.to_string(), current));
        }
        let new_etag = fresh_etag();
        seq.state = state;
        seq.state.etag = Some(new_etag.clone());
        Ok(new_etag)
    }

    async fn update_action(
        &self,
        plan_id: &Id,
        action_id: &Id,
        state: State,
        attempts: Vec<Attempt>,
        expected_etag: &str,
    ) -> Result<String, VaultError> {
        self.check_open()?;
        let mut plans = self.plans.write().await;
        let plan = plans.get_mut(plan_id).ok_or_else(|| VaultError::NotFound(plan_id.to_string()))?;
        let action = super::walk::find_action_mut(plan, action_id).ok_or_else(|| VaultError::NotFound(action_id.to_string()))?;
        let current = action.state.etag.clone().unwrap_or_default();
        if current != expected_etag {
            return Err(VaultError::EtagMismatch(action_id.to_string(), expected_etag.to_string(), current));
        }
        let new_etag = fresh_etag();
        action.state = state;
        action.state.etag = Some(new_etag.clone());
        action.attempts = attempts;
        Ok(new_etag)
    }

    async fn delete(&self, plan_id: &Id) -> Result<(), VaultError> {
        self.check_open()?;
        let mut plans = self.plans.write().await;
        plans.remove(plan_id).ok_or_else(|| VaultError::NotFound(plan_id.to_string()))?;
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<PlanSummary>, VaultError> {
        self.search(Filters::default()).await.map(|mut v| {
            v.truncate(limit);
            v
        })
    }

    async fn search(&self, filters: Filters) -> Result<Vec<PlanSummary>, VaultError> {
        self.check_open()?;
        let plans = self.plans.read().await;
        let mut out: Vec<PlanSummary> = plans
            .values()
            .filter(|p| self.within_retention(&p.id))
            .map(Self::summarize)
            .filter(|s| filters.matches(s))
            .collect();
        out.sort_by(|a, b| b.submit_time.cmp(&a.submit_time));
        Ok(out)
    }

    async fn close(&self) -> Result<(), VaultError> {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}
