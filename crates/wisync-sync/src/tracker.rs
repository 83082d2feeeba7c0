//! Baseline and change tracking
//!
//! [`Baseline`] remembers the parent every node had as of the last sync.
//! [`ChangeSet`] holds the two delta sets diffed against it:
//!
//! - relationship deltas: `id -> new parent`, present iff the node's current
//!   parent differs from its baseline parent
//! - content deltas: ids whose note differs from the remembered original
//!
//! Both keep insertion order, which is the order a push processes them in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};

use wisync_core::domain::{PendingChangeSnapshot, WorkItemId};

use crate::tree::Tree;

// ============================================================================
// Baseline
// ============================================================================

/// Parent of every node as of the last known remote truth
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    parents: HashMap<WorkItemId, Option<WorkItemId>>,
}

impl Baseline {
    /// Records the current parent of every node in `tree`
    pub fn snapshot(tree: &Tree) -> Self {
        Self {
            parents: tree.nodes().map(|n| (n.id, n.parent)).collect(),
        }
    }

    /// Baseline parent of `id`; outer `None` if the id was not captured
    pub fn parent_of(&self, id: WorkItemId) -> Option<Option<WorkItemId>> {
        self.parents.get(&id).copied()
    }

    /// Returns true if `current` is not the recorded parent of `id`
    ///
    /// Ids missing from the baseline always differ.
    pub fn differs(&self, id: WorkItemId, current: Option<WorkItemId>) -> bool {
        self.parents.get(&id) != Some(&current)
    }

    /// Records `parent` as the remote parent of `id`, after a pushed move
    pub fn record(&mut self, id: WorkItemId, parent: Option<WorkItemId>) {
        self.parents.insert(id, parent);
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

// ============================================================================
// ChangeSet
// ============================================================================

/// The pending (unpushed) local changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    relationships: IndexMap<WorkItemId, Option<WorkItemId>>,
    content: IndexSet<WorkItemId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the relationship delta for `id` after a move
    ///
    /// Adds (or retargets) the entry when `current` differs from the
    /// baseline, removes it when the move returned the node to its baseline
    /// parent. Returns whether the node is now pending.
    pub fn record_parent(
        &mut self,
        baseline: &Baseline,
        id: WorkItemId,
        current: Option<WorkItemId>,
    ) -> bool {
        if baseline.differs(id, current) {
            self.relationships.insert(id, current);
            true
        } else {
            self.relationships.shift_remove(&id);
            false
        }
    }

    /// Inserts a relationship delta without consulting a baseline
    pub fn insert_relationship(&mut self, id: WorkItemId, target: Option<WorkItemId>) {
        self.relationships.insert(id, target);
    }

    /// Adds or removes `id` from the content deltas
    pub fn mark_content(&mut self, id: WorkItemId, drifted: bool) {
        if drifted {
            self.content.insert(id);
        } else {
            self.content.shift_remove(&id);
        }
    }

    pub fn remove_relationship(&mut self, id: WorkItemId) {
        self.relationships.shift_remove(&id);
    }

    pub fn remove_content(&mut self, id: WorkItemId) {
        self.content.shift_remove(&id);
    }

    pub fn relationships(&self) -> &IndexMap<WorkItemId, Option<WorkItemId>> {
        &self.relationships
    }

    pub fn content(&self) -> &IndexSet<WorkItemId> {
        &self.content
    }

    pub fn clear_relationships(&mut self) {
        self.relationships.clear();
    }

    pub fn clear(&mut self) {
        self.relationships.clear();
        self.content.clear();
    }

    /// Number of pending entries across both sets
    pub fn len(&self) -> usize {
        self.relationships.len() + self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty() && self.content.is_empty()
    }

    /// Durable form of the current deltas, stamped with `saved_at`
    pub fn to_snapshot(&self, saved_at: DateTime<Utc>) -> PendingChangeSnapshot {
        PendingChangeSnapshot::new(
            self.content.iter().copied().collect(),
            self.relationships.clone(),
            saved_at,
        )
    }
}
