/// Observable status taxonomy shared by every entity kind.
///
/// Numeric values are part of the wire contract (they are what a Vault driver
/// would actually persist), so they are fixed rather than left to enum
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum Status {
    NotStarted = 0,
    Queued = 100,
    Running = 200,
    Completed = 300,
    Failed = 400,
    Stopped = 500,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Stopped)
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::NotStarted
    }
}

/// Failure taxonomy. `Unknown` holds exactly when the owning Plan did not
/// fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum FailureReason {
    Unknown = 0,
    PreCheck = 100,
    Block = 200,
    PostCheck = 300,
    ContCheck = 400,
    Stopped = 500,
    DeferredCheck = 600,
}

impl Default for FailureReason {
    fn default() -> Self {
        FailureReason::Unknown
    }
}
