//! Work item forest
//!
//! [`Tree`] owns every [`WorkItemNode`] in a flat index and keeps the forest
//! shape through ids: `children` lists and `parent` back references. Nothing
//! holds a node by reference across operations, so moves are plain id
//! bookkeeping.
//!
//! ## Invariants
//!
//! - The structure is acyclic.
//! - Every non-root node appears in exactly one parent's `children`.
//! - Every node is indexed exactly once; `roots` lists exactly the nodes
//!   whose `parent` is `None`.
//! - `roots` and every `children` list are sorted by
//!   [`WorkItemNode::display_order`].

use std::collections::HashMap;

use tracing::{debug, warn};

use wisync_core::domain::{DomainError, WorkItemId, WorkItemNode, WorkItemType};
use wisync_core::ports::RemoteItem;

/// Forest of work items rebuilt from every remote fetch
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: HashMap<WorkItemId, WorkItemNode>,
    roots: Vec<WorkItemId>,
}

impl Tree {
    /// Creates an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Tree builder
    // ========================================================================

    /// Builds the forest from a flat list of remote items
    ///
    /// Only the first parent relation of each item is honored. A parent
    /// reference that is malformed, unknown, self-referencing or would close
    /// a cycle is ignored and the item becomes a root. This never fails.
    pub fn build(items: &[RemoteItem]) -> Self {
        let mut tree = Self::new();
        let mut order = Vec::with_capacity(items.len());

        for item in items {
            let id = item.work_item_id();
            if tree.nodes.contains_key(&id) {
                warn!(id = %id, "Duplicate work item in fetch, keeping the first");
                continue;
            }
            let mut node = WorkItemNode::new(
                id,
                item.title.clone(),
                WorkItemType::from_name(&item.work_item_type),
            );
            node.state = item.state.clone();
            node.assigned_to = item.assigned_to.clone();
            node.priority = item.priority.clone();
            tree.nodes.insert(id, node);
            order.push((id, item.parent_id()));
        }

        for (id, parent) in order {
            let attached = match parent {
                Some(parent) if parent == id => {
                    debug!(id = %id, "Ignoring self-referencing parent link");
                    false
                }
                Some(parent) if !tree.nodes.contains_key(&parent) => {
                    debug!(id = %id, parent = %parent, "Parent not in fetch, treating as root");
                    false
                }
                Some(parent) if tree.is_ancestor(id, parent) => {
                    warn!(id = %id, parent = %parent, "Parent link would close a cycle, treating as root");
                    false
                }
                Some(parent) => {
                    tree.link(id, parent);
                    true
                }
                None => false,
            };
            if !attached {
                tree.roots.push(id);
            }
        }

        let parents: Vec<WorkItemId> = tree.nodes.keys().copied().collect();
        for id in parents {
            tree.sort_children(id);
        }
        tree.sort_roots();

        debug!(
            nodes = tree.nodes.len(),
            roots = tree.roots.len(),
            "Tree built"
        );
        tree
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of nodes in the tree
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if `id` is indexed
    pub fn contains(&self, id: WorkItemId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Looks up a node
    pub fn get(&self, id: WorkItemId) -> Option<&WorkItemNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: WorkItemId) -> Option<&mut WorkItemNode> {
        self.nodes.get_mut(&id)
    }

    /// Root ids in display order
    pub fn roots(&self) -> &[WorkItemId] {
        &self.roots
    }

    /// Iterates over every node, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &WorkItemNode> {
        self.nodes.values()
    }

    /// Current parent of `id`; `None` for roots and unknown ids
    pub fn parent_of(&self, id: WorkItemId) -> Option<WorkItemId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// All ids, depth-first in display order
    pub fn walk(&self) -> Vec<WorkItemId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<WorkItemId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Returns true if `ancestor` appears on the parent chain of `node`
    ///
    /// A node is not its own ancestor.
    pub fn is_ancestor(&self, ancestor: WorkItemId, node: WorkItemId) -> bool {
        let mut current = self.parent_of(node);
        // Bounded by node count in case the index is ever inconsistent.
        for _ in 0..=self.nodes.len() {
            match current {
                Some(id) if id == ancestor => return true,
                Some(id) => current = self.parent_of(id),
                None => return false,
            }
        }
        false
    }

    /// Titles from the root down to `id`, for path display
    pub fn path_of(&self, id: WorkItemId) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            path.push(node.title.as_str());
            if path.len() > self.nodes.len() {
                break;
            }
            current = node.parent.and_then(|p| self.nodes.get(&p));
        }
        path.reverse();
        path
    }

    // ========================================================================
    // Structural mutation
    // ========================================================================

    /// Moves `child` under `new_parent`, or to the root list for `None`
    ///
    /// Rejects unknown ids and moves that would make a node its own
    /// ancestor; on rejection the tree is untouched.
    pub fn move_node(
        &mut self,
        child: WorkItemId,
        new_parent: Option<WorkItemId>,
    ) -> Result<(), DomainError> {
        if !self.nodes.contains_key(&child) {
            return Err(DomainError::UnknownItem(child));
        }
        if let Some(parent) = new_parent {
            if !self.nodes.contains_key(&parent) {
                return Err(DomainError::UnknownItem(parent));
            }
            if parent == child || self.is_ancestor(child, parent) {
                return Err(DomainError::CycleRejected {
                    child,
                    new_parent: parent,
                });
            }
        }

        self.unlink(child);
        match new_parent {
            Some(parent) => {
                self.link(child, parent);
                self.sort_children(parent);
            }
            None => {
                self.roots.push(child);
                self.sort_roots();
            }
        }
        Ok(())
    }

    /// Detaches `child` from its parent's children or from the root list
    fn unlink(&mut self, child: WorkItemId) {
        let old_parent = self.parent_of(child);
        match old_parent {
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.retain(|c| *c != child);
                }
            }
            None => self.roots.retain(|r| *r != child),
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
    }

    /// Appends `child` to `parent` without sorting
    fn link(&mut self, child: WorkItemId, parent: WorkItemId) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }

    fn sort_children(&mut self, parent: WorkItemId) {
        let Some(mut children) = self.nodes.get_mut(&parent).map(|n| std::mem::take(&mut n.children))
        else {
            return;
        };
        self.sort_ids(&mut children);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children = children;
        }
    }

    fn sort_roots(&mut self) {
        let mut roots = std::mem::take(&mut self.roots);
        self.sort_ids(&mut roots);
        self.roots = roots;
    }

    fn sort_ids(&self, ids: &mut [WorkItemId]) {
        ids.sort_by(|a, b| match (self.nodes.get(a), self.nodes.get(b)) {
            (Some(a), Some(b)) => WorkItemNode::display_order(a, b),
            _ => a.cmp(b),
        });
    }
}
