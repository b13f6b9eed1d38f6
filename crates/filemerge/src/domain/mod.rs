//! Domain types shared by the scanner, selection tree, and merge engine.

pub mod errors;
pub mod model;

pub use errors::DomainError;
pub use model::{IgnorePreset, IgnoreRules, NodeId, NodeKind, SelectionState};
