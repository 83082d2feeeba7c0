//! Hierarchy sync engine
//!
//! The [`SyncEngine`] owns the local mirror of the remote work item forest and
//! everything diffed against it: the baseline, the relationship and content
//! delta sets, and the original note content each drift check compares with.
//!
//! ## Sync Flow
//!
//! 1. **Rebuild** (pull/refresh): fetch, build the tree, snapshot the
//!    baseline, write missing notes, restore pending changes, re-detect drift
//! 2. **Local mutations**: reparent, promote to root, note edits; each one
//!    updates the deltas and persists them
//! 3. **Push**: relationships first, then content, one item at a time in
//!    insertion order; only succeeded entries are cleared
//!
//! Every mutating method takes `&mut self`; the engine is a single logical
//! mutator. [`EngineStatus`] is the shared read-only view for other tasks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use wisync_core::config::{Config, RemoteConfig};
use wisync_core::domain::{DomainError, PendingChangeSnapshot, ResourceRef, WorkItemId};
use wisync_core::ports::{
    IContentCodec, IDocumentStore, IKeyValueStore, INotificationService, IWorkItemClient,
    Notification, NotificationPriority,
};

use crate::pending::PendingChangeStore;
use crate::tracker::{Baseline, ChangeSet};
use crate::tree::Tree;
use crate::SyncError;

// ============================================================================
// Status
// ============================================================================

/// Executor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pushing,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Pushing => write!(f, "pushing"),
        }
    }
}

/// Cloneable, lock-free view of the engine's state and pending count
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pushing: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl EngineStatus {
    pub fn state(&self) -> SyncState {
        if self.pushing.load(Ordering::Acquire) {
            SyncState::Pushing
        } else {
            SyncState::Idle
        }
    }

    pub fn is_pushing(&self) -> bool {
        self.state() == SyncState::Pushing
    }

    /// Relationship deltas plus content deltas
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn set_pending(&self, count: usize) {
        self.pending.store(count, Ordering::Release);
    }

    /// Flips to `Pushing`; `None` if a push already holds the flag
    fn begin_push(&self) -> Option<PushGuard> {
        self.pushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PushGuard {
                flag: Arc::clone(&self.pushing),
            })
    }
}

/// Returns the engine to `Idle` however the push ends, including a dropped
/// future
struct PushGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for PushGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// Results
// ============================================================================

/// How a rebuild treats notes that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// Overwrite every note from remote, except notes with restored pending
    /// content changes
    Pull,
    /// Only write notes that are missing
    Refresh,
}

/// Summary of a completed rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub nodes: usize,
    pub roots: usize,
    /// Notes created or overwritten from remote content
    pub documents_written: usize,
    /// Notes moved to a new reference after a remote title change
    pub documents_moved: usize,
    /// Restored pending entries kept
    pub restored: usize,
    /// Restored pending entries dropped as stale
    pub dropped: usize,
    /// Pending count after drift re-detection
    pub pending: usize,
}

/// Which half of a push an item belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPhase {
    Relationships,
    Content,
}

/// Why a pushed item stayed pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The remote call returned a non-success status
    RemoteOperationFailed,
    /// The remote call raised an error (network, serialization)
    RemoteTransportError,
    /// The node has no readable note
    LocalDocumentMissing,
    /// The note could not be parsed into field updates
    InvalidDocument,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::RemoteOperationFailed => "remote operation failed",
            FailureKind::RemoteTransportError => "remote transport error",
            FailureKind::LocalDocumentMissing => "local document missing",
            FailureKind::InvalidDocument => "invalid document",
        };
        f.write_str(s)
    }
}

/// A single item that failed to push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushFailure {
    pub id: WorkItemId,
    pub phase: PushPhase,
    pub kind: FailureKind,
}

/// Aggregate result of a push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// Both delta sets were empty; no remote call was made
    pub nothing_to_push: bool,
    pub failures: Vec<PushFailure>,
}

impl PushOutcome {
    fn nothing() -> Self {
        Self {
            nothing_to_push: true,
            ..Self::default()
        }
    }

    fn fail(&mut self, id: WorkItemId, phase: PushPhase, kind: FailureKind) {
        self.failed += 1;
        self.failures.push(PushFailure { id, phase, kind });
    }

    /// "N succeeded, M failed"
    pub fn summary(&self) -> String {
        if self.nothing_to_push {
            return "Nothing to push".to_string();
        }
        format!("{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Tree, baseline and pending changes for one remote project
pub struct SyncEngine {
    client: Arc<dyn IWorkItemClient>,
    documents: Arc<dyn IDocumentStore>,
    codec: Arc<dyn IContentCodec>,
    notifier: Arc<dyn INotificationService>,
    pending_store: PendingChangeStore,
    remote: RemoteConfig,
    drop_stale_pending: bool,

    tree: Tree,
    baseline: Baseline,
    changes: ChangeSet,
    /// Note text rendered from remote at rebuild, updated per pushed item
    original_content: HashMap<WorkItemId, String>,
    /// Reverse index from note reference to owning node
    references: HashMap<ResourceRef, WorkItemId>,
    status: EngineStatus,
}

impl SyncEngine {
    /// Creates an engine with an empty tree
    ///
    /// Nothing is fetched or restored until [`rebuild`](Self::rebuild).
    pub fn new(
        client: Arc<dyn IWorkItemClient>,
        documents: Arc<dyn IDocumentStore>,
        codec: Arc<dyn IContentCodec>,
        key_value_store: Arc<dyn IKeyValueStore>,
        notifier: Arc<dyn INotificationService>,
        config: &Config,
    ) -> Self {
        Self {
            client,
            documents,
            codec,
            notifier,
            pending_store: PendingChangeStore::new(key_value_store, config.state.pending_key.clone()),
            remote: config.remote.clone(),
            drop_stale_pending: config.sync.drop_stale_pending,
            tree: Tree::new(),
            baseline: Baseline::default(),
            changes: ChangeSet::new(),
            original_content: HashMap::new(),
            references: HashMap::new(),
            status: EngineStatus::default(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn pending_count(&self) -> usize {
        self.changes.len()
    }

    /// Shared status handle; stays valid across rebuilds
    pub fn status(&self) -> EngineStatus {
        self.status.clone()
    }

    pub fn pending_store(&self) -> &PendingChangeStore {
        &self.pending_store
    }

    /// The remote note content drift is measured against
    pub fn original_content(&self, id: WorkItemId) -> Option<&str> {
        self.original_content.get(&id).map(String::as_str)
    }

    /// Node owning the note `reference`
    pub fn node_for_reference(&self, reference: &ResourceRef) -> Option<WorkItemId> {
        self.references.get(reference).copied()
    }

    // ------------------------------------------------------------------------
    // Rebuild
    // ------------------------------------------------------------------------

    /// Replaces the tree with fresh remote state and restores pending changes
    ///
    /// # Errors
    /// - [`SyncError::Domain`] if the remote connection is not configured
    /// - [`SyncError::PushInProgress`] while a push runs
    /// - [`SyncError::Remote`] if the fetch fails; local state is untouched
    #[instrument(skip(self))]
    pub async fn rebuild(&mut self, mode: RebuildMode) -> Result<RebuildSummary, SyncError> {
        self.remote.require()?;
        if self.status.is_pushing() {
            return Err(SyncError::PushInProgress);
        }

        let items = self
            .client
            .fetch_all_with_relations()
            .await
            .map_err(SyncError::Remote)?;
        let restored = self
            .pending_store
            .restore()
            .await
            .map_err(SyncError::Storage)?;
        info!(items = items.len(), "Fetched work items");

        let mut keep_local: HashSet<WorkItemId> = restored
            .as_ref()
            .map(|s| s.changed_notes.iter().copied().collect())
            .unwrap_or_default();
        keep_local.extend(self.changes.content().iter().copied());
        let previous_refs: HashMap<WorkItemId, ResourceRef> = self
            .references
            .drain()
            .map(|(reference, id)| (id, reference))
            .collect();
        let mut previous_originals = std::mem::take(&mut self.original_content);

        self.tree = Tree::build(&items);
        self.snapshot_baseline();
        self.changes.clear();

        let mut documents_written = 0;
        let mut documents_moved = 0;
        for item in &items {
            let id = item.work_item_id();
            if self.original_content.contains_key(&id) {
                continue;
            }
            let reference = ResourceRef::for_item(id, &item.title);
            let rendered = self.codec.render(item);
            let local = keep_local.contains(&id);

            if let Some(old) = previous_refs.get(&id).filter(|old| **old != reference) {
                if self.follow_rename(id, old, &reference, local).await? {
                    documents_moved += 1;
                }
            }

            let exists = self
                .documents
                .exists(&reference)
                .await
                .map_err(SyncError::Document)?;
            let overwrite = mode == RebuildMode::Pull && !local;
            let original = if !exists || overwrite {
                self.documents
                    .write(&reference, &rendered)
                    .await
                    .map_err(SyncError::Document)?;
                documents_written += 1;
                rendered
            } else {
                self.kept_note_original(id, &reference, local, previous_originals.remove(&id), rendered)
                    .await
            };

            if let Some(node) = self.tree.get_mut(id) {
                node.resource_ref = Some(reference.clone());
            }
            self.references.insert(reference, id);
            self.original_content.insert(id, original);
        }

        let (restored_count, dropped) = match restored {
            Some(snapshot) => self.merge_restored(snapshot),
            None => (0, 0),
        };

        for id in self.tree.walk() {
            let drifted = self.content_drifted(id).await;
            self.changes.mark_content(id, drifted);
        }

        self.persist().await;
        self.publish_pending();

        let summary = RebuildSummary {
            nodes: self.tree.len(),
            roots: self.tree.roots().len(),
            documents_written,
            documents_moved,
            restored: restored_count,
            dropped,
            pending: self.changes.len(),
        };
        info!(
            nodes = summary.nodes,
            roots = summary.roots,
            written = summary.documents_written,
            moved = summary.documents_moved,
            restored = summary.restored,
            dropped = summary.dropped,
            pending = summary.pending,
            "Rebuild complete"
        );
        Ok(summary)
    }

    /// Adopts the current tree as the remote truth
    ///
    /// Clears the relationship deltas; content deltas are unaffected.
    pub fn snapshot_baseline(&mut self) {
        self.baseline = Baseline::snapshot(&self.tree);
        self.changes.clear_relationships();
        debug!(nodes = self.baseline.len(), "Baseline snapshot taken");
    }

    /// Moves the note of `id` to the reference its new title maps to
    ///
    /// A note with local changes always moves, replacing whatever sits at
    /// `new`. Returns whether a note was moved.
    async fn follow_rename(
        &self,
        id: WorkItemId,
        old: &ResourceRef,
        new: &ResourceRef,
        local: bool,
    ) -> Result<bool, SyncError> {
        let documents = &self.documents;
        if !documents.exists(old).await.map_err(SyncError::Document)? {
            return Ok(false);
        }
        if !local && documents.exists(new).await.map_err(SyncError::Document)? {
            debug!(id = %id, from = %old, to = %new, "Renamed note target exists, leaving old note");
            return Ok(false);
        }
        documents.rename(old, new).await.map_err(SyncError::Document)?;
        info!(id = %id, from = %old, to = %new, "Note follows renamed work item");
        Ok(true)
    }

    /// Original content for a note the rebuild left in place
    ///
    /// Drift must only reflect local edits, so the remote text this note was
    /// last written from wins over the fresh rendering. Without one, a note
    /// with no known local changes is taken as its own original.
    async fn kept_note_original(
        &self,
        id: WorkItemId,
        reference: &ResourceRef,
        local: bool,
        previous: Option<String>,
        rendered: String,
    ) -> String {
        if let Some(previous) = previous {
            return previous;
        }
        if local {
            return rendered;
        }
        match self.documents.read(reference).await {
            Ok(text) => text,
            Err(e) => {
                warn!(id = %id, error = %e, "Cannot read kept note, comparing against remote");
                rendered
            }
        }
    }

    /// Re-applies a restored snapshot against the fresh tree and baseline
    ///
    /// Returns `(kept, dropped)`.
    fn merge_restored(&mut self, snapshot: PendingChangeSnapshot) -> (usize, usize) {
        let mut kept = 0;
        let mut dropped = 0;

        for (child, target) in snapshot.changed_relationships {
            match self.tree.move_node(child, target) {
                Ok(()) => {
                    let current = self.tree.parent_of(child);
                    if self.changes.record_parent(&self.baseline, child, current) {
                        kept += 1;
                    } else if self.drop_stale_pending {
                        debug!(id = %child, "Restored move already applied remotely, dropping");
                        dropped += 1;
                    } else {
                        self.changes.insert_relationship(child, target);
                        kept += 1;
                    }
                }
                Err(e) if self.drop_stale_pending => {
                    warn!(id = %child, error = %e, "Dropping stale pending move");
                    dropped += 1;
                }
                Err(e) => {
                    warn!(id = %child, error = %e, "Keeping pending move that no longer applies locally");
                    self.changes.insert_relationship(child, target);
                    kept += 1;
                }
            }
        }

        for id in snapshot.changed_notes {
            if self.tree.contains(id) || !self.drop_stale_pending {
                self.changes.mark_content(id, true);
                kept += 1;
            } else {
                warn!(id = %id, "Dropping pending note change for unknown work item");
                dropped += 1;
            }
        }

        (kept, dropped)
    }

    // ------------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------------

    /// Moves `child` under `new_parent`
    ///
    /// # Errors
    /// [`DomainError::CycleRejected`] if `new_parent` is `child` or one of its
    /// descendants, [`DomainError::UnknownItem`] for ids not in the tree. Nothing changes on error.
    #[instrument(skip(self))]
    pub async fn reparent(
        &mut self,
        child: WorkItemId,
        new_parent: WorkItemId,
    ) -> Result<(), SyncError> {
        self.move_and_track(child, Some(new_parent)).await
    }

    /// Detaches `node` from its parent, making it a root
    #[instrument(skip(self))]
    pub async fn promote_to_root(&mut self, node: WorkItemId) -> Result<(), SyncError> {
        self.move_and_track(node, None).await
    }

    async fn move_and_track(
        &mut self,
        child: WorkItemId,
        target: Option<WorkItemId>,
    ) -> Result<(), SyncError> {
        self.tree.move_node(child, target)?;
        let pending = self.changes.record_parent(&self.baseline, child, target);
        debug!(pending, "Move recorded");

        self.persist().await;
        self.publish_pending();
        Ok(())
    }

    /// Compares the node's note against its original content
    ///
    /// A missing note, missing original or unreadable note is not drift.
    /// Returns whether the node now has pending content.
    ///
    /// # Errors
    /// [`DomainError::UnknownItem`] for ids not in the tree
    #[instrument(skip(self))]
    pub async fn detect_content_drift(&mut self, id: WorkItemId) -> Result<bool, SyncError> {
        if !self.tree.contains(id) {
            return Err(DomainError::UnknownItem(id).into());
        }
        let drifted = self.content_drifted(id).await;
        self.changes.mark_content(id, drifted);

        self.persist().await;
        self.publish_pending();
        Ok(drifted)
    }

    /// Handles a modification event for a note
    ///
    /// Returns the owning node, or `None` if no node owns `reference`.
    pub async fn on_document_modified(
        &mut self,
        reference: &ResourceRef,
    ) -> Result<Option<WorkItemId>, SyncError> {
        let Some(id) = self.node_for_reference(reference) else {
            debug!(reference = %reference, "Modified note has no owning work item");
            return Ok(None);
        };
        self.detect_content_drift(id).await?;
        Ok(Some(id))
    }

    async fn content_drifted(&self, id: WorkItemId) -> bool {
        let Some(original) = self.original_content.get(&id) else {
            return false;
        };
        let Some(reference) = self.tree.get(id).and_then(|n| n.resource_ref.as_ref()) else {
            return false;
        };

        match self.documents.exists(reference).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(id = %id, error = %e, "Cannot stat note, assuming no drift");
                return false;
            }
        }
        match self.documents.read(reference).await {
            Ok(text) => !self.codec.same_content(&text, original),
            Err(e) => {
                warn!(id = %id, error = %e, "Cannot read note, assuming no drift");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    /// Sends pending changes to the remote
    ///
    /// Per-item failures never abort the push; they are counted in the
    /// returned [`PushOutcome`] and the item stays pending.
    ///
    /// # Errors
    /// - [`SyncError::Domain`] if the remote connection is not configured
    /// - [`SyncError::PushInProgress`] if another push holds the status
    #[instrument(skip(self), fields(pending = self.changes.len()))]
    pub async fn push(&mut self) -> Result<PushOutcome, SyncError> {
        self.remote.require()?;
        let Some(_guard) = self.status.begin_push() else {
            return Err(SyncError::PushInProgress);
        };

        if self.changes.is_empty() {
            info!("Nothing to push");
            let outcome = PushOutcome::nothing();
            self.notify_summary(&outcome).await;
            return Ok(outcome);
        }

        let mut outcome = PushOutcome::default();
        self.push_relationships(&mut outcome).await;
        self.push_content(&mut outcome).await;

        if outcome.failed == 0 {
            self.snapshot_baseline();
            self.changes.clear();
            if let Err(e) = self.pending_store.clear().await {
                error!(error = %e, "Failed to clear pending changes");
            }
        } else {
            self.persist().await;
        }
        self.publish_pending();

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Push complete"
        );
        self.notify_summary(&outcome).await;
        Ok(outcome)
    }

    async fn push_relationships(&mut self, outcome: &mut PushOutcome) {
        let entries: Vec<(WorkItemId, Option<WorkItemId>)> = self
            .changes
            .relationships()
            .iter()
            .map(|(child, target)| (*child, *target))
            .collect();

        for (child, target) in entries {
            let result = match target {
                Some(parent) => self.client.set_parent(child, parent).await,
                // Any non-error return counts; there is nothing left to clear.
                None => self.client.clear_parents(child).await.map(|_| true),
            };

            match result {
                Ok(true) => {
                    debug!(child = %child, target = ?target, "Relationship pushed");
                    self.baseline.record(child, target);
                    self.changes.remove_relationship(child);
                    outcome.succeeded += 1;
                }
                Ok(false) => {
                    warn!(child = %child, target = ?target, "Remote rejected relationship change");
                    outcome.fail(child, PushPhase::Relationships, FailureKind::RemoteOperationFailed);
                }
                Err(e) => {
                    error!(child = %child, target = ?target, error = %e, "Transport error pushing relationship");
                    outcome.fail(child, PushPhase::Relationships, FailureKind::RemoteTransportError);
                }
            }
        }
    }

    async fn push_content(&mut self, outcome: &mut PushOutcome) {
        let ids: Vec<WorkItemId> = self.changes.content().iter().copied().collect();

        for id in ids {
            let Some(reference) = self.tree.get(id).and_then(|n| n.resource_ref.clone()) else {
                warn!(id = %id, "No note for pending content change");
                outcome.fail(id, PushPhase::Content, FailureKind::LocalDocumentMissing);
                continue;
            };
            let text = match self.documents.read(&reference).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(id = %id, reference = %reference, error = %e, "Note missing at push");
                    outcome.fail(id, PushPhase::Content, FailureKind::LocalDocumentMissing);
                    continue;
                }
            };
            let updates = match self.codec.extract_field_updates(&text) {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(id = %id, reference = %reference, error = %e, "Cannot parse note");
                    outcome.fail(id, PushPhase::Content, FailureKind::InvalidDocument);
                    continue;
                }
            };

            match self.client.update_fields(id, &updates).await {
                Ok(true) => {
                    debug!(id = %id, fields = updates.len(), "Content pushed");
                    self.original_content.insert(id, text);
                    self.changes.remove_content(id);
                    outcome.succeeded += 1;
                }
                Ok(false) => {
                    warn!(id = %id, "Remote rejected field update");
                    outcome.fail(id, PushPhase::Content, FailureKind::RemoteOperationFailed);
                }
                Err(e) => {
                    error!(id = %id, error = %e, "Transport error pushing fields");
                    outcome.fail(id, PushPhase::Content, FailureKind::RemoteTransportError);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------------

    /// Writes the current deltas; a storage failure is logged, not returned
    async fn persist(&self) {
        if let Err(e) = self.pending_store.persist(&self.changes).await {
            error!(error = %e, "Failed to persist pending changes");
        }
    }

    fn publish_pending(&self) {
        self.status.set_pending(self.changes.len());
    }

    async fn notify_summary(&self, outcome: &PushOutcome) {
        let notification = if outcome.failed > 0 {
            Notification::error("Push finished with failures", outcome.summary())
        } else if outcome.nothing_to_push {
            Notification::sync("Push", outcome.summary()).with_priority(NotificationPriority::Low)
        } else {
            Notification::sync("Push complete", outcome.summary())
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(error = %e, "Failed to deliver push notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use wisync_core::config::ConfigBuilder;
    use wisync_core::domain::FieldUpdates;
    use wisync_core::ports::{RemoteItem, RemoteRelation};

    use crate::codec::FrontmatterCodec;
    use crate::memory::{MemoryDocumentStore, MemoryKeyValueStore};

    fn id(n: i64) -> WorkItemId {
        WorkItemId::new(n)
    }

    fn item(n: i64, title: &str, kind: &str, parent: Option<i64>) -> RemoteItem {
        RemoteItem {
            id: n,
            title: title.into(),
            work_item_type: kind.into(),
            state: "New".into(),
            description: format!("Description of {title}"),
            relations: parent
                .map(|p| {
                    vec![RemoteRelation::parent(format!(
                        "https://dev.azure.com/acme/_apis/wit/workItems/{p}"
                    ))]
                })
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct FakeClient {
        items: Vec<RemoteItem>,
        rejected: HashSet<i64>,
        broken: HashSet<i64>,
        fail_fetch: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn respond(&self, target: WorkItemId, call: String) -> anyhow::Result<bool> {
            self.calls.lock().unwrap().push(call);
            if self.broken.contains(&target.value()) {
                return Err(anyhow!("connection reset"));
            }
            Ok(!self.rejected.contains(&target.value()))
        }

        fn push_calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.as_str() != "fetch")
                .cloned()
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl IWorkItemClient for FakeClient {
        async fn fetch_all_with_relations(&self) -> anyhow::Result<Vec<RemoteItem>> {
            self.calls.lock().unwrap().push("fetch".into());
            if self.fail_fetch {
                return Err(anyhow!("unauthorized"));
            }
            Ok(self.items.clone())
        }

        async fn set_parent(&self, child: WorkItemId, parent: WorkItemId) -> anyhow::Result<bool> {
            self.respond(child, format!("set_parent {child} {parent}"))
        }

        async fn clear_parents(&self, child: WorkItemId) -> anyhow::Result<bool> {
            self.respond(child, format!("clear_parents {child}"))
        }

        async fn update_fields(
            &self,
            id: WorkItemId,
            _updates: &FieldUpdates,
        ) -> anyhow::Result<bool> {
            self.respond(id, format!("update_fields {id}"))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait::async_trait]
    impl INotificationService for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Harness {
        engine: SyncEngine,
        client: Arc<FakeClient>,
        documents: Arc<MemoryDocumentStore>,
        kv: Arc<MemoryKeyValueStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn configured() -> Config {
        ConfigBuilder::new()
            .remote_organization("acme")
            .remote_project("web")
            .build()
    }

    fn harness_with(client: FakeClient, kv: Arc<MemoryKeyValueStore>, config: &Config) -> Harness {
        let client = Arc::new(client);
        let documents = Arc::new(MemoryDocumentStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = SyncEngine::new(
            client.clone(),
            documents.clone(),
            Arc::new(FrontmatterCodec::new()),
            kv.clone(),
            notifier.clone(),
            config,
        );
        Harness {
            engine,
            client,
            documents,
            kv,
            notifier,
        }
    }

    fn sample_items() -> Vec<RemoteItem> {
        vec![
            item(1, "Checkout", "Epic", None),
            item(2, "Payment form", "Feature", Some(1)),
            item(3, "Search", "Epic", None),
            item(4, "Validate card", "Task", Some(2)),
            item(5, "Autocomplete", "Feature", Some(3)),
        ]
    }

    async fn rebuilt(client: FakeClient) -> Harness {
        let mut h = harness_with(client, Arc::new(MemoryKeyValueStore::new()), &configured());
        h.engine.rebuild(RebuildMode::Pull).await.unwrap();
        h
    }

    fn sample_client() -> FakeClient {
        FakeClient {
            items: sample_items(),
            ..Default::default()
        }
    }

    async fn stored_snapshot(kv: &MemoryKeyValueStore) -> serde_json::Value {
        let raw = kv
            .get(wisync_core::config::DEFAULT_PENDING_KEY)
            .await
            .unwrap()
            .expect("snapshot stored");
        serde_json::from_str(&raw).unwrap()
    }

    fn reference(h: &Harness, n: i64) -> ResourceRef {
        h.engine
            .tree()
            .get(id(n))
            .and_then(|node| node.resource_ref.clone())
            .unwrap()
    }

    // ------------------------------------------------------------------------
    // Rebuild
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_rebuild_builds_tree_and_writes_notes() {
        let h = rebuilt(sample_client()).await;

        assert_eq!(h.engine.tree().len(), 5);
        assert_eq!(h.engine.tree().roots(), &[id(1), id(3)]);
        assert_eq!(h.documents.len(), 5);
        assert_eq!(h.engine.pending_count(), 0);
        assert_eq!(h.engine.baseline().parent_of(id(4)), Some(Some(id(2))));
        assert_eq!(
            h.engine.node_for_reference(&ResourceRef::from_raw("2-payment-form.md")),
            Some(id(2))
        );
    }

    #[tokio::test]
    async fn test_rebuild_requires_configuration() {
        let mut h = harness_with(
            sample_client(),
            Arc::new(MemoryKeyValueStore::new()),
            &Config::default(),
        );
        let err = h.engine.rebuild(RebuildMode::Pull).await.unwrap_err();
        assert!(matches!(err, SyncError::Domain(DomainError::ValidationFailed(_))));
        assert!(h.client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_fetch_failure_keeps_state() {
        let mut h = rebuilt(sample_client()).await;
        h.engine.client = Arc::new(FakeClient {
            fail_fetch: true,
            ..Default::default()
        });

        let err = h.engine.rebuild(RebuildMode::Refresh).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));
        assert_eq!(h.engine.tree().len(), 5);
    }

    #[tokio::test]
    async fn test_refresh_keeps_edited_notes() {
        let mut h = rebuilt(sample_client()).await;
        let r = reference(&h, 4);
        let edited = h.documents.read(&r).await.unwrap().replace("state: New", "state: Active");
        h.documents.write(&r, &edited).await.unwrap();

        let summary = h.engine.rebuild(RebuildMode::Refresh).await.unwrap();
        assert_eq!(summary.documents_written, 0);
        assert_eq!(h.documents.read(&r).await.unwrap(), edited);
        assert!(h.engine.changes().content().contains(&id(4)));
    }

    #[tokio::test]
    async fn test_pull_overwrites_untracked_notes() {
        let mut h = rebuilt(sample_client()).await;
        let r = reference(&h, 4);
        h.documents.write(&r, "scribbles").await.unwrap();

        let summary = h.engine.rebuild(RebuildMode::Pull).await.unwrap();
        assert_eq!(summary.documents_written, 5);
        assert_ne!(h.documents.read(&r).await.unwrap(), "scribbles");
        assert_eq!(h.engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_pull_keeps_notes_with_pending_content() {
        let mut h = rebuilt(sample_client()).await;
        let r = reference(&h, 4);
        h.documents.write(&r, "---\ntitle: Renamed\n---\nnew body\n").await.unwrap();
        assert!(h.engine.detect_content_drift(id(4)).await.unwrap());

        h.engine.rebuild(RebuildMode::Pull).await.unwrap();
        assert_eq!(
            h.documents.read(&r).await.unwrap(),
            "---\ntitle: Renamed\n---\nnew body\n"
        );
        assert_eq!(h.engine.changes().content().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_ignores_remote_only_changes() {
        let mut h = rebuilt(sample_client()).await;
        let mut items = sample_items();
        items[3].state = "Active".into();
        let client = Arc::new(FakeClient {
            items,
            ..Default::default()
        });
        h.engine.client = client.clone();

        h.engine.rebuild(RebuildMode::Refresh).await.unwrap();
        assert!(h.engine.changes().content().is_empty());

        let outcome = h.engine.push().await.unwrap();
        assert!(outcome.nothing_to_push);
        assert!(client.push_calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_after_restart_takes_untracked_notes_as_original() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let mut first = harness_with(sample_client(), kv.clone(), &configured());
        first.engine.rebuild(RebuildMode::Pull).await.unwrap();

        let mut items = sample_items();
        items[3].state = "Active".into();
        let mut second = harness_with(
            FakeClient {
                items,
                ..Default::default()
            },
            kv,
            &configured(),
        );
        second.engine.documents = first.documents.clone();

        second.engine.rebuild(RebuildMode::Refresh).await.unwrap();
        assert_eq!(second.engine.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_pull_moves_edited_note_after_remote_rename() {
        let mut h = rebuilt(sample_client()).await;
        let old = reference(&h, 4);
        let edited = h.documents.read(&old).await.unwrap().replace("state: New", "state: Done");
        h.documents.write(&old, &edited).await.unwrap();
        assert!(h.engine.detect_content_drift(id(4)).await.unwrap());

        let mut items = sample_items();
        items[3].title = "Validate payment card".into();
        h.engine.client = Arc::new(FakeClient {
            items,
            ..Default::default()
        });
        let summary = h.engine.rebuild(RebuildMode::Pull).await.unwrap();

        let new = ResourceRef::for_item(id(4), "Validate payment card");
        assert_eq!(summary.documents_moved, 1);
        assert!(!h.documents.exists(&old).await.unwrap());
        assert_eq!(h.documents.read(&new).await.unwrap(), edited);
        assert_eq!(h.engine.node_for_reference(&new), Some(id(4)));
        assert!(h.engine.changes().content().contains(&id(4)));
    }

    #[tokio::test]
    async fn test_pull_renames_untouched_note_without_leftover() {
        let mut h = rebuilt(sample_client()).await;
        let old = reference(&h, 4);

        let mut items = sample_items();
        items[3].title = "Validate payment card".into();
        h.engine.client = Arc::new(FakeClient {
            items,
            ..Default::default()
        });
        h.engine.rebuild(RebuildMode::Pull).await.unwrap();

        assert!(!h.documents.exists(&old).await.unwrap());
        assert_eq!(h.documents.len(), 5);
        let note = h.documents.read(&reference(&h, 4)).await.unwrap();
        assert!(note.contains("Validate payment card"));
        assert!(h.engine.changes().is_empty());
    }

    // ------------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_reparent_records_delta_and_persists() {
        let mut h = rebuilt(sample_client()).await;

        h.engine.reparent(id(4), id(5)).await.unwrap();

        assert_eq!(h.engine.tree().parent_of(id(4)), Some(id(5)));
        assert_eq!(h.engine.changes().relationships().get(&id(4)), Some(&Some(id(5))));
        assert_eq!(h.engine.status().pending_count(), 1);
        let stored = stored_snapshot(&h.kv).await;
        assert_eq!(stored["changedRelationships"], serde_json::json!({"4": 5}));
    }

    #[tokio::test]
    async fn test_reparent_rejects_cycle_without_changes() {
        let mut h = rebuilt(sample_client()).await;
        let before = h.engine.tree().walk();

        let err = h.engine.reparent(id(1), id(4)).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Domain(DomainError::CycleRejected { .. })
        ));
        let err = h.engine.reparent(id(2), id(2)).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Domain(DomainError::CycleRejected { .. })
        ));

        assert_eq!(h.engine.tree().walk(), before);
        assert!(h.engine.changes().is_empty());
    }

    #[tokio::test]
    async fn test_reparent_unknown_item() {
        let mut h = rebuilt(sample_client()).await;
        let err = h.engine.reparent(id(99), id(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Domain(DomainError::UnknownItem(_))));
    }

    #[tokio::test]
    async fn test_promote_and_revert() {
        let mut h = rebuilt(sample_client()).await;

        h.engine.promote_to_root(id(2)).await.unwrap();
        assert!(h.engine.tree().roots().contains(&id(2)));
        assert_eq!(h.engine.changes().relationships().get(&id(2)), Some(&None));

        h.engine.reparent(id(2), id(1)).await.unwrap();
        assert!(h.engine.changes().is_empty());
        assert_eq!(h.engine.status().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_document_event_detects_and_clears_drift() {
        let mut h = rebuilt(sample_client()).await;
        let r = reference(&h, 5);
        let original = h.documents.read(&r).await.unwrap();

        h.documents
            .write(&r, &original.replace("Description of", "Changed"))
            .await
            .unwrap();
        assert_eq!(h.engine.on_document_modified(&r).await.unwrap(), Some(id(5)));
        assert!(h.engine.changes().content().contains(&id(5)));

        h.documents.write(&r, &original).await.unwrap();
        h.engine.on_document_modified(&r).await.unwrap();
        assert!(h.engine.changes().is_empty());

        let unknown = ResourceRef::from_raw("404-nope.md");
        assert_eq!(h.engine.on_document_modified(&unknown).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_note_is_not_drift() {
        let mut h = rebuilt(sample_client()).await;
        h.documents.remove(&reference(&h, 3));
        assert!(!h.engine.detect_content_drift(id(3)).await.unwrap());
    }

    // ------------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_restore_reapplies_moves() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let mut first = harness_with(sample_client(), kv.clone(), &configured());
        first.engine.rebuild(RebuildMode::Pull).await.unwrap();
        first.engine.reparent(id(4), id(5)).await.unwrap();
        first.engine.promote_to_root(id(2)).await.unwrap();

        let mut second = harness_with(sample_client(), kv, &configured());
        let summary = second.engine.rebuild(RebuildMode::Refresh).await.unwrap();

        assert_eq!(summary.restored, 2);
        assert_eq!(second.engine.tree().parent_of(id(4)), Some(id(5)));
        let keys: Vec<WorkItemId> = second
            .engine
            .changes()
            .relationships()
            .keys()
            .copied()
            .collect();
        assert_eq!(keys, vec![id(4), id(2)]);
    }

    #[tokio::test]
    async fn test_restore_drops_stale_entries() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let snapshot = serde_json::json!({
            "changedNotes": [42, 5],
            "changedRelationships": {"4": 77, "1": 4, "5": 1},
            "lastSaved": 1_718_000_000_000i64
        });
        kv.set(wisync_core::config::DEFAULT_PENDING_KEY, &snapshot.to_string())
            .await
            .unwrap();

        let mut h = harness_with(sample_client(), kv, &configured());
        let summary = h.engine.rebuild(RebuildMode::Refresh).await.unwrap();

        // 4 -> 77 unknown target, 1 -> 4 cycle, 42 unknown; note 5 is
        // restored but matches remote so drift detection clears it.
        assert_eq!(summary.dropped, 3);
        let rels: Vec<_> = h.engine.changes().relationships().iter().collect();
        assert_eq!(rels, vec![(&id(5), &Some(id(1)))]);
        assert!(h.engine.changes().content().is_empty());
    }

    #[tokio::test]
    async fn test_restore_keeps_stale_entries_when_configured() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let snapshot = serde_json::json!({
            "changedNotes": [42],
            "changedRelationships": {"4": 77},
            "lastSaved": 1_718_000_000_000i64
        });
        kv.set(wisync_core::config::DEFAULT_PENDING_KEY, &snapshot.to_string())
            .await
            .unwrap();
        let config = ConfigBuilder::new()
            .remote_organization("acme")
            .remote_project("web")
            .sync_drop_stale_pending(false)
            .build();

        let mut h = harness_with(sample_client(), kv, &config);
        let summary = h.engine.rebuild(RebuildMode::Refresh).await.unwrap();

        assert_eq!(summary.dropped, 0);
        assert_eq!(
            h.engine.changes().relationships().get(&id(4)),
            Some(&Some(id(77)))
        );
        assert!(h.engine.changes().content().contains(&id(42)));
        assert_eq!(h.engine.tree().parent_of(id(4)), Some(id(2)));
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_push_partial_failure_keeps_failed_entry() {
        let mut h = rebuilt(FakeClient {
            items: sample_items(),
            rejected: [4].into_iter().collect(),
            ..Default::default()
        })
        .await;
        h.engine.reparent(id(2), id(3)).await.unwrap();
        h.engine.reparent(id(4), id(5)).await.unwrap();

        let outcome = h.engine.push().await.unwrap();

        assert_eq!((outcome.succeeded, outcome.failed), (1, 1));
        assert_eq!(
            outcome.failures,
            vec![PushFailure {
                id: id(4),
                phase: PushPhase::Relationships,
                kind: FailureKind::RemoteOperationFailed,
            }]
        );
        let rels: Vec<_> = h.engine.changes().relationships().iter().collect();
        assert_eq!(rels, vec![(&id(4), &Some(id(5)))]);
        let stored = stored_snapshot(&h.kv).await;
        assert_eq!(stored["changedRelationships"], serde_json::json!({"4": 5}));
        assert_eq!(
            h.client.push_calls(),
            vec!["set_parent 2 3".to_string(), "set_parent 4 5".to_string()]
        );
    }

    #[tokio::test]
    async fn test_partial_push_advances_baseline_for_pushed_moves() {
        let mut h = rebuilt(FakeClient {
            items: sample_items(),
            rejected: [4].into_iter().collect(),
            ..Default::default()
        })
        .await;
        h.engine.reparent(id(2), id(3)).await.unwrap();
        h.engine.reparent(id(4), id(5)).await.unwrap();
        h.engine.push().await.unwrap();

        assert_eq!(h.engine.baseline().parent_of(id(2)), Some(Some(id(3))));
        assert_eq!(h.engine.baseline().parent_of(id(4)), Some(Some(id(2))));

        // Moving 2 back to its old parent is now a change the remote needs.
        h.engine.reparent(id(2), id(1)).await.unwrap();
        assert_eq!(
            h.engine.changes().relationships().get(&id(2)),
            Some(&Some(id(1)))
        );
    }

    #[tokio::test]
    async fn test_push_transport_error_counts_as_failure() {
        let mut h = rebuilt(FakeClient {
            items: sample_items(),
            broken: [2].into_iter().collect(),
            ..Default::default()
        })
        .await;
        h.engine.promote_to_root(id(2)).await.unwrap();

        let outcome = h.engine.push().await.unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::RemoteTransportError);
        assert_eq!(h.engine.changes().relationships().get(&id(2)), Some(&None));
    }

    #[tokio::test]
    async fn test_push_clear_parents_counts_as_success() {
        let mut h = rebuilt(FakeClient {
            items: sample_items(),
            rejected: [2].into_iter().collect(),
            ..Default::default()
        })
        .await;
        h.engine.promote_to_root(id(2)).await.unwrap();

        let outcome = h.engine.push().await.unwrap();
        assert_eq!((outcome.succeeded, outcome.failed), (1, 0));
        assert_eq!(h.client.push_calls(), vec!["clear_parents 2".to_string()]);
    }

    #[tokio::test]
    async fn test_push_full_success_clears_store_and_rebaselines() {
        let mut h = rebuilt(sample_client()).await;
        h.engine.reparent(id(4), id(5)).await.unwrap();
        let r = reference(&h, 3);
        let edited = h.documents.read(&r).await.unwrap().replace("state: New", "state: Done");
        h.documents.write(&r, &edited).await.unwrap();
        h.engine.on_document_modified(&r).await.unwrap();
        assert_eq!(h.engine.pending_count(), 2);

        let outcome = h.engine.push().await.unwrap();

        assert_eq!((outcome.succeeded, outcome.failed), (2, 0));
        assert!(h.engine.changes().is_empty());
        assert_eq!(h.engine.baseline().parent_of(id(4)), Some(Some(id(5))));
        assert_eq!(h.engine.original_content(id(3)), Some(edited.as_str()));
        assert_eq!(
            stored_snapshot(&h.kv).await,
            serde_json::json!({"changedNotes": [], "changedRelationships": {}, "lastSaved": 0})
        );
        assert_eq!(h.engine.status().state(), SyncState::Idle);
        assert_eq!(h.engine.status().pending_count(), 0);

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.last().unwrap().body, "2 succeeded, 0 failed");
    }

    #[tokio::test]
    async fn test_push_missing_note_fails_that_item_only() {
        let mut h = rebuilt(sample_client()).await;
        for n in [3, 5] {
            let r = reference(&h, n);
            let edited = h.documents.read(&r).await.unwrap().replace("state: New", "state: Done");
            h.documents.write(&r, &edited).await.unwrap();
            h.engine.detect_content_drift(id(n)).await.unwrap();
        }
        h.documents.remove(&reference(&h, 3));

        let outcome = h.engine.push().await.unwrap();

        assert_eq!((outcome.succeeded, outcome.failed), (1, 1));
        assert_eq!(outcome.failures[0].kind, FailureKind::LocalDocumentMissing);
        assert_eq!(h.engine.changes().content().iter().copied().collect::<Vec<_>>(), vec![id(3)]);
        assert_eq!(h.client.push_calls(), vec!["update_fields 5".to_string()]);
    }

    #[tokio::test]
    async fn test_second_push_is_nothing_to_push() {
        let mut h = rebuilt(sample_client()).await;
        h.engine.reparent(id(4), id(5)).await.unwrap();
        h.engine.push().await.unwrap();
        let calls_after_first = h.client.push_calls().len();

        let outcome = h.engine.push().await.unwrap();

        assert!(outcome.nothing_to_push);
        assert_eq!((outcome.succeeded, outcome.failed), (0, 0));
        assert_eq!(h.client.push_calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_push_requires_configuration() {
        let mut h = harness_with(
            sample_client(),
            Arc::new(MemoryKeyValueStore::new()),
            &Config::default(),
        );
        let err = h.engine.push().await.unwrap_err();
        assert!(matches!(err, SyncError::Domain(DomainError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_rebuild_rejected_while_pushing() {
        let mut h = rebuilt(sample_client()).await;
        let status = h.engine.status();
        let guard = status.begin_push().expect("idle");
        assert_eq!(status.state(), SyncState::Pushing);

        let err = h.engine.rebuild(RebuildMode::Pull).await.unwrap_err();
        assert!(matches!(err, SyncError::PushInProgress));
        let err = h.engine.push().await.unwrap_err();
        assert!(matches!(err, SyncError::PushInProgress));

        drop(guard);
        assert_eq!(status.state(), SyncState::Idle);
        h.engine.rebuild(RebuildMode::Pull).await.unwrap();
    }

    #[test]
    fn test_outcome_summary() {
        let mut outcome = PushOutcome::default();
        outcome.succeeded = 3;
        outcome.fail(id(1), PushPhase::Content, FailureKind::InvalidDocument);
        assert_eq!(outcome.summary(), "3 succeeded, 1 failed");
        assert_eq!(PushOutcome::nothing().summary(), "Nothing to push");
    }
}
