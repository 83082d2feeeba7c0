//! Pending change snapshot
//!
//! The only state the engine persists. Everything else is rebuilt from a
//! remote fetch plus this record.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::newtypes::WorkItemId;

/// Durable record of unpushed local changes
///
/// Serialized shape:
///
/// ```json
/// { "changedNotes": [12, 40], "changedRelationships": { "7": 3, "9": null }, "lastSaved": 1718000000000 }
/// ```
///
/// `lastSaved` is unix milliseconds; `0` marks an empty (cleared) snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChangeSnapshot {
    #[serde(default)]
    pub changed_notes: Vec<WorkItemId>,
    #[serde(default)]
    pub changed_relationships: IndexMap<WorkItemId, Option<WorkItemId>>,
    #[serde(default)]
    pub last_saved: i64,
}

impl PendingChangeSnapshot {
    /// The cleared snapshot written after a fully successful push
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a snapshot stamped with `saved_at`
    pub fn new(
        changed_notes: Vec<WorkItemId>,
        changed_relationships: IndexMap<WorkItemId, Option<WorkItemId>>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            changed_notes,
            changed_relationships,
            last_saved: saved_at.timestamp_millis(),
        }
    }

    /// Returns true if the snapshot was written by a save (not a clear)
    pub fn is_saved(&self) -> bool {
        self.last_saved > 0
    }

    /// Returns true if the snapshot carries no changes
    pub fn is_empty(&self) -> bool {
        self.changed_notes.is_empty() && self.changed_relationships.is_empty()
    }

    /// Time of the last save, if any
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        if self.is_saved() {
            DateTime::from_timestamp_millis(self.last_saved)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_shape() {
        let json = serde_json::to_value(PendingChangeSnapshot::empty()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "changedNotes": [],
                "changedRelationships": {},
                "lastSaved": 0
            })
        );
    }

    #[test]
    fn test_snapshot_serialized_shape() {
        let mut rels = IndexMap::new();
        rels.insert(WorkItemId::new(7), Some(WorkItemId::new(3)));
        rels.insert(WorkItemId::new(9), None);
        let snapshot = PendingChangeSnapshot {
            changed_notes: vec![WorkItemId::new(12)],
            changed_relationships: rels,
            last_saved: 1_718_000_000_000,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "changedNotes": [12],
                "changedRelationships": { "7": 3, "9": null },
                "lastSaved": 1_718_000_000_000_i64
            })
        );
    }

    #[test]
    fn test_snapshot_parses_and_keeps_order() {
        let raw = r#"{"changedNotes":[4,1],"changedRelationships":{"9":null,"2":5},"lastSaved":10}"#;
        let snapshot: PendingChangeSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(
            snapshot.changed_notes,
            vec![WorkItemId::new(4), WorkItemId::new(1)]
        );
        let keys: Vec<i64> = snapshot
            .changed_relationships
            .keys()
            .map(WorkItemId::value)
            .collect();
        assert_eq!(keys, vec![9, 2]);
        assert_eq!(
            snapshot.changed_relationships[&WorkItemId::new(2)],
            Some(WorkItemId::new(5))
        );
        assert!(snapshot.is_saved());
    }

    #[test]
    fn test_saved_at() {
        let now = Utc::now();
        let snapshot = PendingChangeSnapshot::new(Vec::new(), IndexMap::new(), now);
        assert_eq!(
            snapshot.saved_at().map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
        assert!(PendingChangeSnapshot::empty().saved_at().is_none());
    }
}
