//! Plain-text renderers used by the command-line front end.

pub mod file_tree;
pub mod summary;
