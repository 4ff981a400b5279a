//! Execution engine for the coercion workflow system: the Action/Checks/
//! Sequence/Block/Plan runners, the abstract Vault contract plus an
//! in-memory reference implementation, the Plugin Registry, and crash
//! recovery. The Workstream façade lives in `coercion-infra`, which owns
//! engine lifecycle and configuration.

pub mod cancel;
pub mod constants;
pub mod errors;
pub mod recovery;
pub mod registry;
pub mod runner;
pub mod vault;

pub use cancel::Cancellation;
pub use errors::{classify_vault_error, CoreError, ErrorClass, VaultError};
pub use recovery::{recover_all, RecoveredPlan};
pub use registry::{ActionContext, Plugin, PluginRegistry};
pub use runner::{ActionRunner, BlockRunner, ChecksRunner, PlanExecutor, SequenceRunner};
pub use vault::{Filters, InMemoryVault, PlanSummary, Vault};
