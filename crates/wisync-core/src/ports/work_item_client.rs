//! Remote work item client port (driven/secondary port)
//!
//! This module defines the interface to the remote work-tracking store.
//! The engine only needs a full fetch with relations plus three write
//! operations; transport, authentication and paging belong to the adapter.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific.
//!   `Ok(false)` is a structured failure reported by the remote system,
//!   `Err(_)` is a transport failure (network, serialization).
//! - All write operations are expected to be idempotent per item, so
//!   re-issuing `set_parent` with the same target is safe.

use serde::{Deserialize, Serialize};

use crate::domain::{FieldUpdates, WorkItemId};

/// Relation type naming a work item's parent
pub const PARENT_RELATION: &str = "System.LinkTypes.Hierarchy-Reverse";

/// Relation type naming a work item's child
pub const CHILD_RELATION: &str = "System.LinkTypes.Hierarchy-Forward";

/// A typed link from one work item to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRelation {
    /// Relation type reference name (e.g. [`PARENT_RELATION`])
    pub rel: String,
    /// URL of the target work item; the id is the last path segment
    pub url: String,
}

impl RemoteRelation {
    /// Creates a parent link pointing at `url`
    pub fn parent(url: impl Into<String>) -> Self {
        Self {
            rel: PARENT_RELATION.to_string(),
            url: url.into(),
        }
    }

    /// Returns true if this relation names the item's parent
    pub fn is_parent(&self) -> bool {
        self.rel == PARENT_RELATION
    }

    /// Id of the target work item, if the URL ends in a numeric segment
    pub fn target_id(&self) -> Option<WorkItemId> {
        WorkItemId::from_relation_url(&self.url)
    }
}

/// A work item as returned by a full fetch
///
/// This is a port-level DTO; the tree builder maps it to `WorkItemNode`s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: i64,
    pub title: String,
    /// Remote type name, e.g. `"User Story"`
    pub work_item_type: String,
    pub state: String,
    pub assigned_to: String,
    pub priority: String,
    pub description: String,
    pub tags: Vec<String>,
    pub relations: Vec<RemoteRelation>,
}

impl RemoteItem {
    /// The item's id as a domain id
    pub fn work_item_id(&self) -> WorkItemId {
        WorkItemId::new(self.id)
    }

    /// Target of the first parent relation, if any
    ///
    /// Only the first parent edge is honored; a malformed target counts as
    /// no parent.
    pub fn parent_id(&self) -> Option<WorkItemId> {
        self.relations
            .iter()
            .find(|r| r.is_parent())
            .and_then(RemoteRelation::target_id)
    }
}

/// Port trait for the remote work-tracking store
#[async_trait::async_trait]
pub trait IWorkItemClient: Send + Sync {
    /// Fetches every work item in scope together with its relations
    async fn fetch_all_with_relations(&self) -> anyhow::Result<Vec<RemoteItem>>;

    /// Replaces the parent of `child` with `parent`
    ///
    /// Returns `Ok(true)` when the remote system accepted the change.
    async fn set_parent(&self, child: WorkItemId, parent: WorkItemId) -> anyhow::Result<bool>;

    /// Removes every parent relation from `child`
    async fn clear_parents(&self, child: WorkItemId) -> anyhow::Result<bool>;

    /// Writes the present fields of `updates` to item `id`
    async fn update_fields(&self, id: WorkItemId, updates: &FieldUpdates) -> anyhow::Result<bool>;
}
