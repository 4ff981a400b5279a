pub mod memory;
pub mod walk;

pub use memory::InMemoryVault;

use crate::errors::VaultError;
use async_trait::async_trait;
use coercion_domain::{Attempt, FailureReason, Id, Plan, State, Status};

/// Compact per-Plan record returned by `List`/`Search`, newest `SubmitTime`
/// first.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub id: Id,
    pub name: String,
    pub group_id: Option<String>,
    pub status: Status,
    pub submit_time: chrono::DateTime<chrono::Utc>,
}

/// Search filters, AND-composed.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub by_ids: Option<Vec<Id>>,
    pub by_group_ids: Option<Vec<String>>,
    pub by_status: Option<Vec<Status>>,
}

impl Filters {
    pub fn by_status(statuses: Vec<Status>) -> Self {
        Self { by_status: Some(statuses), ..Default::default() }
    }

    fn matches(&self, summary: &PlanSummary) -> bool {
        if let Some(ids) = &self.by_ids {
            if !ids.contains(&summary.id) {
                return false;
            }
        }
        if let Some(groups) = &self.by_group_ids {
            match &summary.group_id {
                Some(g) if groups.contains(g) => {}
                _ => return false,
            }
        }
        if let Some(statuses) = &self.by_status {
            if !statuses.contains(&summary.status) {
                return false;
            }
        }
        true
    }
}

/// The abstract durable-storage contract. Concrete drivers (document-
/// oriented, blob-oriented) are out of scope; this crate ships only the
/// trait and an in-memory reference implementation, [`InMemoryVault`].
#[async_trait]
pub trait Vault: Send + Sync {
    /// Persists a full Plan tree transactionally, minting an ETag for every
    /// entity in it. Returns the Plan's own new ETag.
    async fn create(&self, plan: Plan) -> Result<String, VaultError>;

    /// Loads a full Plan tree, honoring the driver's retention window.
    async fn read(&self, plan_id: &Id) -> Result<Plan, VaultError>;

    /// Loads a full Plan tree bypassing retention (recovery-only).
    async fn read_direct(&self, plan_id: &Id) -> Result<Plan, VaultError>;

    async fn update_plan(
        &self,
        plan_id: &Id,
        state: State,
        reason: FailureReason,
        expected_etag: &str,
    ) -> Result<String, VaultError>;

    async fn update_block(&self, plan_id: &Id, block_id: &Id, state: State, expected_etag: &str) -> Result<String, VaultError>;

    async fn update_checks(&self, plan_id: &Id, checks_id: &Id, state: State, expected_etag: &str) -> Result<String, VaultError>;

    async fn update_sequence(
        &self,
        plan_id: &Id,
        sequence_id: &Id,
        state: State,
        expected_etag: &str,
    ) -> Result<String, VaultError>;

    async fn update_action(
        &self,
        plan_id: &Id,
        action_id: &Id,
        state: State,
        attempts: Vec<Attempt>,
        expected_etag: &str,
    ) -> Result<String, VaultError>;

    /// Cascade delete.
    async fn delete(&self, plan_id: &Id) -> Result<(), VaultError>;

    async fn list(&self, limit: usize) -> Result<Vec<PlanSummary>, VaultError>;

    async fn search(&self, filters: Filters) -> Result<Vec<PlanSummary>, VaultError>;

    async fn close(&self) -> Result<(), VaultError>;
}
