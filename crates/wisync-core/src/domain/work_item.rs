//! Work item nodes
//!
//! A [`WorkItemNode`] is the local mirror of one remote work item. Nodes do
//! not own each other: children and parent are stored as ids and resolved
//! through the tree's index, which is the sole owner of every node.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::newtypes::{ResourceRef, WorkItemId};

// ============================================================================
// WorkItemType
// ============================================================================

/// The kind of a work item, which drives sibling ordering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkItemType {
    Epic,
    Feature,
    UserStory,
    Task,
    Bug,
    Issue,
    /// Any type name the ordering table does not know about
    Other(String),
}

impl WorkItemType {
    /// Map a remote type name (e.g. `"User Story"`) to a type
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "Epic" => Self::Epic,
            "Feature" => Self::Feature,
            "User Story" => Self::UserStory,
            "Task" => Self::Task,
            "Bug" => Self::Bug,
            "Issue" => Self::Issue,
            other => Self::Other(other.to_string()),
        }
    }

    /// Position in the type-priority table; unknown types sort last
    pub fn rank(&self) -> u8 {
        match self {
            Self::Epic => 0,
            Self::Feature => 1,
            Self::UserStory => 2,
            Self::Task => 3,
            Self::Bug => 4,
            Self::Issue => 5,
            Self::Other(_) => 6,
        }
    }

    /// The remote type name
    pub fn name(&self) -> &str {
        match self {
            Self::Epic => "Epic",
            Self::Feature => "Feature",
            Self::UserStory => "User Story",
            Self::Task => "Task",
            Self::Bug => "Bug",
            Self::Issue => "Issue",
            Self::Other(name) => name,
        }
    }
}

impl Display for WorkItemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// WorkItemNode
// ============================================================================

/// One remote work item in the local tree
///
/// Metadata strings are replaced wholesale on every rebuild. `children` is
/// kept sorted with [`WorkItemNode::display_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemNode {
    pub id: WorkItemId,
    pub title: String,
    pub item_type: WorkItemType,
    pub state: String,
    pub assigned_to: String,
    pub priority: String,
    pub children: Vec<WorkItemId>,
    /// Non-owning back reference; `None` for roots
    pub parent: Option<WorkItemId>,
    /// Backing note, if one has been derived for this node
    pub resource_ref: Option<ResourceRef>,
}

impl WorkItemNode {
    /// Creates a detached node with no relations resolved
    pub fn new(id: WorkItemId, title: impl Into<String>, item_type: WorkItemType) -> Self {
        Self {
            id,
            title: title.into(),
            item_type,
            state: String::new(),
            assigned_to: String::new(),
            priority: String::new(),
            children: Vec::new(),
            parent: None,
            resource_ref: None,
        }
    }

    /// Returns true if this node has no parent
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Sibling ordering: type rank first, then title
    pub fn display_order(a: &Self, b: &Self) -> Ordering {
        a.item_type
            .rank()
            .cmp(&b.item_type.rank())
            .then_with(|| a.title.cmp(&b.title))
    }
}
