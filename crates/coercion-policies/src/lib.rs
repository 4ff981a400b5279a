//! Pure-value policies used by the engine: retry backoff and the plugin
//! schema "secure field" gate. Deliberately free of any engine or storage
//! dependency: these are functions, not services.

pub mod retry;
pub mod secret;

pub use retry::RetryPolicy;
pub use secret::{is_secret_field_name, Schema, SchemaField};
