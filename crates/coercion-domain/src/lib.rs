//! Entity model, status taxonomy, and submit-time validation for the
//! coercion workflow engine (Plan → Block → Sequence → Action, plus the five
//! Checks categories). Storage and execution live in `coercion-core`; this
//! crate only knows about shapes and invariants.

pub mod entities;
pub mod entity;
pub mod error;
pub mod ids;
pub mod state;
pub mod status;

pub use entities::{Action, Attempt, Block, CheckSlots, Checks, Plan, PluginError, Sequence};
pub use entity::{Entity, EntityKind, EntityRefMut};
pub use error::DomainError;
pub use ids::Id;
pub use state::State;
pub use status::{FailureReason, Status};
