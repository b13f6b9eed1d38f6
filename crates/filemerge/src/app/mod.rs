//! Application layer orchestrating domain logic and infrastructure.

pub mod encoding;
pub mod merge;
pub mod preferences;
pub mod report;
pub mod scan;
pub mod session;
pub mod tree;
