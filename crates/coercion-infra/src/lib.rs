//! Engine lifecycle: the Workstream façade and its configuration. Storage
//! and execution themselves live in `coercion-core`; this crate only wires
//! them together the way an embedding program would.

pub mod config;
pub mod error;
pub mod workstream;

pub use config::{init_dotenv, EngineConfig};
pub use error::WorkstreamError;
pub use workstream::Workstream;
