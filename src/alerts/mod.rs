//! Per-channel alert coordination
//!
//! The catalog defines the static policy (priorities, display actions,
//! supersession); the engine applies it to the live alert state of each
//! channel.

pub mod catalog;
pub mod engine;
pub mod types;

pub use catalog::AlertCatalog;
pub use engine::{AlertEngine, AlertSnapshot};
pub use types::{AlertAction, AlertDefinition, AlertKind};
