//! Domain newtypes
//!
//! Strongly-typed wrappers for work item identifiers and the opaque
//! references that key a node's backing document.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// WorkItemId
// ============================================================================

/// Identifier assigned to a work item by the remote system
///
/// Serialized as a bare integer so the pending change snapshot keeps the
/// `{ changedNotes: [int], changedRelationships: { "<int>": int|null } }` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(i64);

impl WorkItemId {
    /// Wrap a raw remote id
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw integer value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Parse the id a relation URL points at
    ///
    /// Relation targets look like
    /// `https://dev.azure.com/org/_apis/wit/workItems/42`; the id is the
    /// last path segment. Returns `None` when that segment is not numeric.
    #[must_use]
    pub fn from_relation_url(url: &str) -> Option<Self> {
        url.trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse::<i64>().ok())
            .map(Self)
    }
}

impl Display for WorkItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("{s}: {e}")))
    }
}

impl From<i64> for WorkItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// ResourceRef
// ============================================================================

/// Maximum number of slug characters kept in a document reference
const MAX_SLUG_LEN: usize = 60;

/// Opaque handle to the note backing a work item
///
/// Derived deterministically from `(id, title)` so the same remote item
/// always maps to the same document while its title is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(String);

impl ResourceRef {
    /// Build the reference for a work item
    ///
    /// The result is `"{id}-{slug}.md"`, where the slug keeps ASCII
    /// alphanumerics (lowercased) and collapses everything else into single
    /// dashes. An empty slug yields `"{id}.md"`.
    #[must_use]
    pub fn for_item(id: WorkItemId, title: &str) -> Self {
        let mut slug = String::with_capacity(title.len());
        let mut pending_dash = false;
        for ch in title.chars() {
            if ch.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(ch.to_ascii_lowercase());
                if slug.len() >= MAX_SLUG_LEN {
                    break;
                }
            } else {
                pending_dash = true;
            }
        }

        if slug.is_empty() {
            Self(format!("{id}.md"))
        } else {
            Self(format!("{id}-{slug}.md"))
        }
    }

    /// Wrap an existing reference string (e.g. a file name seen by a watcher)
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The reference as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
