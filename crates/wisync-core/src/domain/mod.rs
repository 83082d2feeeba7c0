//! Domain entities
//!
//! This module contains the core domain types for wisync:
//! - Newtypes for work item identifiers and document references
//! - Work item nodes and the type-priority ordering used for display
//! - Typed field updates extracted from a note body
//! - The durable pending change snapshot
//! - Domain-specific error types

pub mod errors;
pub mod field_updates;
pub mod newtypes;
pub mod snapshot;
pub mod work_item;

// Re-export commonly used types
pub use errors::DomainError;
pub use field_updates::{FieldUpdates, PatchOperation};
pub use newtypes::{ResourceRef, WorkItemId};
pub use snapshot::PendingChangeSnapshot;
pub use work_item::{WorkItemNode, WorkItemType};
