//! Typed field updates
//!
//! [`FieldUpdates`] is what the content codec extracts from a note body and
//! what the remote client receives on a content push. Every field is an
//! `Option`: `None` means "leave the remote field alone", while
//! `Some(String::new())` / `Some(vec![])` means "set it to empty". The
//! distinction matters for JSON-patch style remote APIs, where clearing tags
//! is an explicit write.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote field reference names used when building patch operations
pub mod fields {
    pub const TITLE: &str = "System.Title";
    pub const DESCRIPTION: &str = "System.Description";
    pub const STATE: &str = "System.State";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
    pub const TAGS: &str = "System.Tags";
}

/// Separator the remote store uses between tags in a single field
pub const TAG_SEPARATOR: &str = "; ";

/// Field values to write back for one work item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// A single JSON-patch operation against a work item's fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    fn add(field: &str, value: Value) -> Self {
        Self {
            op: "add".to_string(),
            path: format!("/fields/{field}"),
            value,
        }
    }
}

impl FieldUpdates {
    /// Creates an empty update set (touches nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no field is present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of present fields
    pub fn len(&self) -> usize {
        [
            self.title.is_some(),
            self.description.is_some(),
            self.state.is_some(),
            self.assigned_to.is_some(),
            self.priority.is_some(),
            self.tags.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// Converts present fields into JSON-patch operations
    ///
    /// Absent fields produce no operation. Present-but-empty fields produce
    /// an `add` with an empty string, which clears the remote value. A
    /// numeric priority is sent as a number.
    pub fn to_patch_operations(&self) -> Vec<PatchOperation> {
        let mut ops = Vec::with_capacity(self.len());

        if let Some(title) = &self.title {
            ops.push(PatchOperation::add(fields::TITLE, Value::from(title.as_str())));
        }
        if let Some(description) = &self.description {
            ops.push(PatchOperation::add(
                fields::DESCRIPTION,
                Value::from(description.as_str()),
            ));
        }
        if let Some(state) = &self.state {
            ops.push(PatchOperation::add(fields::STATE, Value::from(state.as_str())));
        }
        if let Some(assigned_to) = &self.assigned_to {
            ops.push(PatchOperation::add(
                fields::ASSIGNED_TO,
                Value::from(assigned_to.as_str()),
            ));
        }
        if let Some(priority) = &self.priority {
            let value = match priority.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::from(priority.as_str()),
            };
            ops.push(PatchOperation::add(fields::PRIORITY, value));
        }
        if let Some(tags) = &self.tags {
            ops.push(PatchOperation::add(
                fields::TAGS,
                Value::from(tags.join(TAG_SEPARATOR)),
            ));
        }

        ops
    }
}
