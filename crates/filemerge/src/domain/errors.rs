//! Domain-specific errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::model::NodeId;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("no root directory has been built")]
    NoRoot,
    #[error("unknown tree node {0:?}")]
    UnknownNode(NodeId),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("path is not inside the tree root: {}", .0.display())]
    OutsideRoot(PathBuf),
    #[error("path is not present in the tree: {}", .0.display())]
    NotInTree(PathBuf),
}
