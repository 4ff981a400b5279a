use crate::error::DomainError;
use crate::status::Status;
use chrono::{DateTime, Utc};

/// `State` is the mutable part of every entity: everything else about a
/// Plan's tree is immutable once submitted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct State {
    pub status: Status,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Version tag handed back by the Vault on every write; `None` before the
    /// entity has ever been persisted.
    pub etag: Option<String>,
}

impl Default for State {
    fn default() -> Self {
        Self { status: Status::NotStarted, start: None, end: None, etag: None }
    }
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions into `Running`, stamping `start` if this is the first time.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::IllegalTransition { from: self.status, to: Status::Running });
        }
        self.status = Status::Running;
        if self.start.is_none() {
            self.start = Some(now);
        }
        Ok(())
    }

    pub fn mark_queued(&mut self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::IllegalTransition { from: self.status, to: Status::Queued });
        }
        self.status = Status::Queued;
        Ok(())
    }

    /// Moves into a terminal status, setting `End` exactly once.
    pub fn mark_terminal(&mut self, status: Status, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !status.is_terminal() {
            return Err(DomainError::Internal(format!("{:?} is not a terminal status", status)));
        }
        if self.status.is_terminal() {
            // Never move away from a terminal status.
            return Err(DomainError::IllegalTransition { from: self.status, to: status });
        }
        if self.start.is_none() {
            self.start = Some(now);
        }
        self.status = status;
        self.end = Some(now);
        Ok(())
    }
}
