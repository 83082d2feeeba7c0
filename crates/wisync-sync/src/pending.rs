//! Pending change store
//!
//! Serializes the delta sets into a single key of an [`IKeyValueStore`] so
//! unpushed local changes survive a restart.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use wisync_core::domain::PendingChangeSnapshot;
use wisync_core::ports::IKeyValueStore;

use crate::tracker::ChangeSet;

/// Durable home of the [`PendingChangeSnapshot`]
#[derive(Clone)]
pub struct PendingChangeStore {
    store: Arc<dyn IKeyValueStore>,
    key: String,
}

impl PendingChangeStore {
    /// Creates a store writing under `key`
    pub fn new(store: Arc<dyn IKeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The key the snapshot is stored under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Overwrites the stored snapshot with the current deltas
    #[instrument(skip(self, changes), fields(key = %self.key, pending = changes.len()))]
    pub async fn persist(&self, changes: &ChangeSet) -> Result<PendingChangeSnapshot> {
        let snapshot = changes.to_snapshot(Utc::now());
        self.write(&snapshot).await?;
        debug!(
            notes = snapshot.changed_notes.len(),
            relationships = snapshot.changed_relationships.len(),
            "Pending changes persisted"
        );
        Ok(snapshot)
    }

    /// Reads back a previously saved snapshot
    ///
    /// Returns `None` if nothing was stored, the stored value cannot be
    /// parsed, or it is a cleared snapshot (`lastSaved` of 0).
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn restore(&self) -> Result<Option<PendingChangeSnapshot>> {
        Ok(self.load().await?.filter(PendingChangeSnapshot::is_saved))
    }

    /// Reads the stored snapshot as-is, including a cleared one
    pub async fn load(&self) -> Result<Option<PendingChangeSnapshot>> {
        let Some(raw) = self
            .store
            .get(&self.key)
            .await
            .context("Failed to read pending changes")?
        else {
            return Ok(None);
        };

        match serde_json::from_str::<PendingChangeSnapshot>(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable pending change snapshot");
                Ok(None)
            }
        }
    }

    /// Writes the empty snapshot (`lastSaved` 0)
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn clear(&self) -> Result<()> {
        self.write(&PendingChangeSnapshot::empty()).await?;
        debug!("Pending changes cleared");
        Ok(())
    }

    async fn write(&self, snapshot: &PendingChangeSnapshot) -> Result<()> {
        let value =
            serde_json::to_string(snapshot).context("Failed to serialize pending changes")?;
        self.store
            .set(&self.key, &value)
            .await
            .context("Failed to write pending changes")
    }
}
