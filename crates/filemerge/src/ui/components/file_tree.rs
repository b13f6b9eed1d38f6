//! Text rendering of the selection tree.

use std::fmt::Write as _;

use crate::app::tree::SelectionTree;

const INDENT: &str = "    ";
const UNLOADED_SUFFIX: &str = " ...";

/// Renders materialized nodes with their checkbox state, one per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTree;

impl FileTree {
    pub fn render(&self, tree: &SelectionTree) -> String {
        let mut out = String::new();
        for (depth, id) in tree.preorder() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            let _ = write!(
                out,
                "{}{} {}",
                INDENT.repeat(depth),
                node.selection().marker(),
                node.name()
            );
            if node.is_dir() {
                out.push('/');
                if !node.is_loaded() && node.is_expandable() {
                    out.push_str(UNLOADED_SUFFIX);
                }
            }
            out.push('\n');
        }
        out
    }
}
