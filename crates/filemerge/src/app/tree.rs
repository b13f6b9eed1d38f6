//! Tri-state selection tree over a lazily expanded directory hierarchy.
//!
//! Nodes live in an arena owned by [`SelectionTree`]; each node records its children in display
//! order and a parent handle that is only used for bottom-up recomputation. Directories start
//! unloaded and are scanned on first expansion. Toggling a directory forces the whole subtree to
//! load so a selected directory never hides unselected descendants.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::app::scan::Scanner;
use crate::domain::errors::DomainError;
use crate::domain::model::{IgnoreRules, NodeId, NodeKind, SelectionState};

pub type Result<T> = std::result::Result<T, DomainError>;

/// One filesystem entry materialized in the tree.
#[derive(Debug, Clone)]
pub struct Node {
    path: PathBuf,
    name: String,
    kind: NodeKind,
    selection: SelectionState,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    loaded: bool,
    expandable: bool,
}

impl Node {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn selection(&self) -> SelectionState {
        self.selection
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the node can show children: unloaded directories that may have entries, or loaded
    /// directories that do.
    pub fn is_expandable(&self) -> bool {
        self.expandable
    }
}

/// Owns the materialized nodes for one root directory and their selection state.
#[derive(Debug, Default)]
pub struct SelectionTree {
    scanner: Scanner,
    rules: IgnoreRules,
    nodes: Vec<Node>,
    index: HashMap<PathBuf, NodeId>,
    root: Option<NodeId>,
    /// Saved selections whose nodes are not materialized yet. Never overlaps `index`.
    pending: BTreeSet<PathBuf>,
}

impl SelectionTree {
    pub fn new(rules: IgnoreRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn rules(&self) -> &IgnoreRules {
        &self.rules
    }

    /// Replace the ignore rules. Takes effect on the next [`SelectionTree::build_root`].
    pub fn set_rules(&mut self, rules: IgnoreRules) {
        self.rules = rules;
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.root.and_then(|id| self.node(id)).map(Node::path)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// Number of materialized nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Discard the current tree and create an unloaded root for `path`.
    pub fn build_root(&mut self, path: impl Into<PathBuf>) -> Result<NodeId> {
        let path = path.into();
        if !path.is_dir() {
            return Err(DomainError::NotADirectory(path));
        }

        self.nodes.clear();
        self.index.clear();
        self.pending.clear();
        self.root = None;

        let expandable = !self.scanner.scan(&path, &self.rules).is_empty();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let id = self.push(Node {
            path,
            name,
            kind: NodeKind::Directory,
            selection: SelectionState::Unselected,
            children: Vec::new(),
            parent: None,
            loaded: false,
            expandable,
        });
        self.root = Some(id);
        tracing::debug!(root = %self.nodes[id.0].path.display(), "built selection tree root");
        Ok(id)
    }

    /// Scan an unloaded directory and materialize its children. Returns the number of children
    /// created; already loaded directories are left untouched.
    pub fn expand(&mut self, id: NodeId) -> Result<usize> {
        let created = self.load_children(id)?;
        if created > 0 {
            self.recompute_from(id);
        }
        Ok(created)
    }

    /// Load every directory under the root. Returns the number of nodes created.
    pub fn expand_all(&mut self) -> Result<usize> {
        let mut created = 0;
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            if self.nodes[id.0].is_dir() {
                created += self.expand(id)?;
                stack.extend(self.nodes[id.0].children.iter().copied());
            }
        }
        Ok(created)
    }

    /// Flip a node between selected and unselected and propagate through the tree.
    ///
    /// Directories push the new state to every descendant, loading unexpanded directories on the
    /// way. Ancestors are then recomputed up to the root.
    pub fn toggle(&mut self, id: NodeId) -> Result<SelectionState> {
        let target = self.get(id)?.selection.toggled();

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.nodes[current.0].selection = target;
            if self.nodes[current.0].is_dir() {
                self.load_children(current)?;
                stack.extend(self.nodes[current.0].children.iter().copied());
            }
        }

        self.recompute_ancestors(id);
        Ok(target)
    }

    /// Apply a saved selection. Materialized nodes are marked selected directly; the rest stay
    /// pending until their parent is expanded. Returns the number of nodes marked immediately.
    pub fn restore_selection<I>(&mut self, saved: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut applied = 0;
        for path in saved {
            if let Some(id) = self.find(&path) {
                self.nodes[id.0].selection = SelectionState::Selected;
                applied += 1;
            } else if path.exists() {
                self.pending.insert(path);
            } else {
                tracing::debug!(
                    path = %path.display(),
                    "dropping saved selection for missing path"
                );
            }
        }
        self.recompute_all();
        applied
    }

    /// Selected file nodes in pre-order, matching on-screen order.
    pub fn selected_leaf_files(&self) -> Vec<PathBuf> {
        self.preorder()
            .into_iter()
            .map(|(_, id)| &self.nodes[id.0])
            .filter(|node| {
                node.kind == NodeKind::File && node.selection == SelectionState::Selected
            })
            .map(|node| node.path.clone())
            .collect()
    }

    /// Every path that should be persisted as selected: selected nodes of either kind plus
    /// restored selections that have not been materialized yet.
    pub fn selected_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .preorder()
            .into_iter()
            .map(|(_, id)| &self.nodes[id.0])
            .filter(|node| node.selection == SelectionState::Selected)
            .map(|node| node.path.clone())
            .collect();
        paths.extend(self.pending.iter().cloned());
        paths
    }

    /// Saved selections still waiting for their parent directory to be expanded.
    pub fn pending_selection(&self) -> impl Iterator<Item = &Path> {
        self.pending.iter().map(PathBuf::as_path)
    }

    /// Materialized nodes in pre-order with their depth below the root.
    pub fn preorder(&self) -> Vec<(usize, NodeId)> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let Some(root) = self.root else {
            return ordered;
        };

        let mut stack = vec![(0, root)];
        while let Some((depth, id)) = stack.pop() {
            ordered.push((depth, id));
            for child in self.nodes[id.0].children.iter().rev() {
                stack.push((depth + 1, *child));
            }
        }
        ordered
    }

    /// Expand every ancestor of `path` so that it is materialized, returning its handle.
    pub fn reveal(&mut self, path: &Path) -> Result<NodeId> {
        let root = self.root.ok_or(DomainError::NoRoot)?;
        let relative = path
            .strip_prefix(&self.nodes[root.0].path)
            .map_err(|_| DomainError::OutsideRoot(path.to_path_buf()))?
            .to_path_buf();

        let mut current = root;
        for component in relative.components() {
            self.expand(current)?;
            let name = component.as_os_str().to_string_lossy();
            current = self.nodes[current.0]
                .children
                .iter()
                .copied()
                .find(|child| self.nodes[child.0].name == name)
                .ok_or_else(|| DomainError::NotInTree(path.to_path_buf()))?;
        }
        Ok(current)
    }

    fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(DomainError::UnknownNode(id))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.index.insert(node.path.clone(), id);
        self.nodes.push(node);
        id
    }

    /// Scan and attach children without touching any aggregate state.
    fn load_children(&mut self, id: NodeId) -> Result<usize> {
        let node = self.get(id)?;
        if !node.is_dir() {
            return Err(DomainError::NotADirectory(node.path.clone()));
        }
        if node.loaded {
            return Ok(0);
        }

        let inherited = node.selection == SelectionState::Selected;
        let entries = self.scanner.scan(&node.path, &self.rules);

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let restored = self.pending.remove(&entry.path);
            let selection = if restored || inherited {
                SelectionState::Selected
            } else {
                SelectionState::Unselected
            };
            let child = self.push(Node {
                expandable: entry.kind.is_dir(),
                path: entry.path,
                name: entry.name,
                kind: entry.kind,
                selection,
                children: Vec::new(),
                parent: Some(id),
                loaded: false,
            });
            children.push(child);
        }

        let created = children.len();
        let node = &mut self.nodes[id.0];
        node.expandable = created > 0;
        node.children = children;
        node.loaded = true;
        tracing::debug!(path = %node.path.display(), children = created, "expanded directory");
        Ok(created)
    }

    fn aggregate(&self, id: NodeId) -> Option<SelectionState> {
        SelectionState::aggregate(
            self.nodes[id.0]
                .children
                .iter()
                .map(|child| self.nodes[child.0].selection),
        )
    }

    fn recompute_from(&mut self, id: NodeId) {
        if let Some(state) = self.aggregate(id) {
            self.nodes[id.0].selection = state;
        }
        self.recompute_ancestors(id);
    }

    fn recompute_ancestors(&mut self, id: NodeId) {
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            if let Some(state) = self.aggregate(parent) {
                self.nodes[parent.0].selection = state;
            }
            current = self.nodes[parent.0].parent;
        }
    }

    fn recompute_all(&mut self) {
        for (_, id) in self.preorder().into_iter().rev() {
            if let Some(state) = self.aggregate(id) {
                self.nodes[id.0].selection = state;
            }
        }
    }
}
