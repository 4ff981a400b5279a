//! Reference plugin implementations used by the test suite and the demo CLI.
//! The engine itself ships none of these; an embedding program supplies its
//! own plugins through the same [`coercion_core::registry::Plugin`] trait.

pub mod check;
pub mod fail;
pub mod sleep;

pub use check::CheckPlugin;
pub use fail::{AlwaysFailPlugin, FlakyPlugin};
pub use sleep::SleepPlugin;
