use crate::error::DomainError;
use crate::ids::Id;
use crate::state::State;
use crate::status::FailureReason;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;
pub const MIN_ACTION_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CONTINUOUS_DELAY_MS: i64 = 30_000;

/// One invocation of a plugin inside an Action, journaled.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Attempt {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub resp: Option<Value>,
    pub err: Option<PluginError>,
}

impl Attempt {
    pub fn started(now: DateTime<Utc>) -> Self {
        Self { start: now, end: None, resp: None, err: None }
    }
}

/// Structured error surfaced by a plugin's `Execute`, or synthesized by the
/// engine (timeouts, recovery, unknown-plugin). `permanent` aborts retry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PluginError {
    pub message: String,
    pub permanent: bool,
}

impl PluginError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), permanent: true }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), permanent: false }
    }
}

/// One plugin invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Action {
    pub id: Id,
    pub plan_id: Id,
    pub name: String,
    pub descr: String,
    pub plugin: String,
    pub req: Value,
    pub timeout_ms: u64,
    pub retries: u32,
    pub attempts: Vec<Attempt>,
    pub state: State,
}

impl Action {
    pub fn new(plan_id: Id, name: impl Into<String>, plugin: impl Into<String>, req: Value) -> Self {
        Self {
            id: Id::new(),
            plan_id,
            name: name.into(),
            descr: String::new(),
            plugin: plugin.into(),
            req,
            timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
            retries: 0,
            attempts: Vec::new(),
            state: State::new(),
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.timeout_ms < MIN_ACTION_TIMEOUT_MS {
            return Err(DomainError::TimeoutTooShort(self.timeout_ms));
        }
        Ok(())
    }

    /// Appends an attempt. Attempts are strictly append-only and monotone in
    /// `start`.
    pub fn push_attempt(&mut self, attempt: Attempt) -> Result<(), DomainError> {
        if let Some(last) = self.attempts.last() {
            if attempt.start < last.start {
                return Err(DomainError::Internal("attempt start went backwards".into()));
            }
        }
        self.attempts.push(attempt);
        Ok(())
    }
}

/// Serial chain of Actions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Sequence {
    pub id: Id,
    pub plan_id: Id,
    pub name: String,
    pub descr: String,
    pub actions: Vec<Action>,
    pub state: State,
}

impl Sequence {
    pub fn new(plan_id: Id, name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self { id: Id::new(), plan_id, name: name.into(), descr: String::new(), actions, state: State::new() }
    }
}

/// A parallel set of Actions attached as a gating predicate. An empty
/// `Actions` list is equivalent to absent; callers should use
/// [`CheckSlots::normalize`] to enforce that rather than testing emptiness ad
/// hoc everywhere.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Checks {
    pub id: Id,
    pub plan_id: Id,
    pub actions: Vec<Action>,
    /// Only meaningful for Continuous checks: interval between rounds.
    /// `None` means the default (30s); negative means no delay.
    pub delay_ms: Option<i64>,
    pub state: State,
}

impl Checks {
    pub fn new(plan_id: Id, actions: Vec<Action>) -> Self {
        Self { id: Id::new(), plan_id, actions, delay_ms: None, state: State::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn effective_delay_ms(&self) -> i64 {
        self.delay_ms.unwrap_or(DEFAULT_CONTINUOUS_DELAY_MS)
    }
}

/// The five Checks slots shared by Plan and Block. A `Some(checks)` whose
/// `actions` is empty is treated as absent wherever these slots are read
/// through [`CheckSlots::normalize`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CheckSlots {
    pub bypass: Option<Checks>,
    pub pre: Option<Checks>,
    pub cont: Option<Checks>,
    pub post: Option<Checks>,
    pub deferred: Option<Checks>,
}

impl CheckSlots {
    pub fn normalize(mut self) -> Self {
        let drop_if_empty = |c: Option<Checks>| c.filter(|checks| !checks.is_empty());
        self.bypass = drop_if_empty(self.bypass);
        self.pre = drop_if_empty(self.pre);
        self.cont = drop_if_empty(self.cont);
        self.post = drop_if_empty(self.post);
        self.deferred = drop_if_empty(self.deferred);
        self
    }
}

/// Parallel-sequences unit within a Plan; the unit of tolerated failure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub id: Id,
    pub plan_id: Id,
    pub name: String,
    pub descr: String,
    pub entrance_delay_ms: u64,
    pub exit_delay_ms: u64,
    pub checks: CheckSlots,
    pub sequences: Vec<Sequence>,
    pub concurrency: u32,
    /// -1 means "all" (never fails for sequence-failure reasons).
    pub tolerated_failures: i64,
    /// Advisory only: the derived list index is authoritative; this is
    /// compared against it for discrepancy-flagging during recovery, never
    /// silently reconciled.
    pub pos: usize,
    pub state: State,
}

impl Block {
    pub fn new(plan_id: Id, name: impl Into<String>, sequences: Vec<Sequence>, pos: usize) -> Self {
        Self {
            id: Id::new(),
            plan_id,
            name: name.into(),
            descr: String::new(),
            entrance_delay_ms: 0,
            exit_delay_ms: 0,
            checks: CheckSlots::default(),
            sequences,
            concurrency: 1,
            tolerated_failures: 0,
            pos,
            state: State::new(),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.concurrency < 1 {
            return Err(DomainError::InvalidConcurrency(self.concurrency as i64));
        }
        if self.tolerated_failures < -1 {
            return Err(DomainError::InvalidToleratedFailures(self.tolerated_failures));
        }
        for seq in &self.sequences {
            for action in &seq.actions {
                action.validate()?;
            }
        }
        for checks in [&self.checks.bypass, &self.checks.pre, &self.checks.cont, &self.checks.post, &self.checks.deferred]
            .into_iter()
            .flatten()
        {
            for action in &checks.actions {
                action.validate()?;
            }
        }
        Ok(())
    }
}

/// User-submitted workflow root.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    pub id: Id,
    pub key: Option<String>,
    pub name: String,
    pub descr: String,
    pub group_id: Option<String>,
    pub submit_time: DateTime<Utc>,
    pub meta: Vec<u8>,
    pub checks: CheckSlots,
    pub blocks: Vec<Block>,
    pub reason: FailureReason,
    pub state: State,
}

impl Plan {
    pub fn new(name: impl Into<String>, blocks: Vec<Block>) -> Self {
        let id = Id::new();
        Self {
            submit_time: id.created_at().unwrap_or_else(Utc::now),
            id,
            key: None,
            name: name.into(),
            descr: String::new(),
            group_id: None,
            meta: Vec::new(),
            checks: CheckSlots::default(),
            blocks,
            reason: FailureReason::Unknown,
            state: State::new(),
        }
    }

    /// Submit-time structural validation. Plugin existence and `ValidateReq`
    /// are checked by the caller (the Workstream façade), which has access to
    /// the registry; this only checks what the domain model alone can know.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::EmptyPlanName);
        }
        if self.blocks.is_empty() {
            return Err(DomainError::NoBlocks);
        }
        for (idx, block) in self.blocks.iter().enumerate() {
            if block.pos != idx {
                // Advisory discrepancy; surfaced, not silently fixed.
                tracing::warn!(plan = %self.id, block = %block.id, stored_pos = block.pos, derived_pos = idx, "block Pos disagrees with list index");
            }
            block.validate()?;
        }
        for checks in [&self.checks.bypass, &self.checks.pre, &self.checks.cont, &self.checks.post, &self.checks.deferred]
            .into_iter()
            .flatten()
        {
            for action in &checks.actions {
                action.validate()?;
            }
        }
        Ok(())
    }
}
