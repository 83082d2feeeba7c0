//! Domain error types
//!
//! Errors raised synchronously by structural operations on the local tree.
//! Per-item push failures are not errors at this level; they are tallied by
//! the sync executor instead.

use thiserror::Error;

use super::newtypes::WorkItemId;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Required remote-connection configuration is missing
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The requested move would make a node its own ancestor
    #[error("Moving {child} under {new_parent} would create a cycle")]
    CycleRejected {
        /// The node being moved
        child: WorkItemId,
        /// The rejected target parent
        new_parent: WorkItemId,
    },

    /// The id is not present in the current tree
    #[error("Unknown work item: {0}")]
    UnknownItem(WorkItemId),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
