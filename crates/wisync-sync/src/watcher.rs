//! Note watching and debounced modification queue
//!
//! [`DocumentWatcher`] wraps the `notify` crate to watch the notes root and
//! turns create/modify events into the [`ResourceRef`] of the note touched.
//! Editors save in bursts, so [`DebouncedRefQueue`] holds each reference
//! until it has been quiet for the configured window.
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  DocumentWatcher ──→ mpsc ──→ spawn_debouncer ──→ mpsc ──→ SyncEngine::on_document_modified
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use wisync_core::domain::ResourceRef;

use crate::documents::FsDocumentStore;

const CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// DocumentWatcher
// ============================================================================

/// Watches the notes root for edited notes
///
/// Stops watching when dropped.
pub struct DocumentWatcher {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl DocumentWatcher {
    /// Starts watching the root of `documents`
    ///
    /// Returns the watcher and a receiver yielding the reference of every
    /// note created or modified, undebounced.
    ///
    /// # Errors
    /// Returns an error if the OS watcher cannot be created or the root
    /// cannot be watched
    pub fn start(documents: &FsDocumentStore) -> Result<(Self, mpsc::Receiver<ResourceRef>)> {
        let (tx, rx) = mpsc::channel::<ResourceRef>(CHANNEL_CAPACITY);
        let store = documents.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for reference in map_notify_event(&store, &event) {
                        if let Err(e) = tx.blocking_send(reference) {
                            warn!(error = %e, "Failed to send note event (receiver dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "Note watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create note watcher")?;

        let root = documents.root().to_path_buf();
        info!(root = %root.display(), "Watching notes");
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch path: {}", root.display()))?;

        Ok((Self { watcher, root }, rx))
    }

    /// The directory being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stops watching
    pub fn stop(mut self) -> Result<()> {
        info!(root = %self.root.display(), "Stopping note watch");
        self.watcher
            .unwatch(&self.root)
            .with_context(|| format!("Failed to unwatch path: {}", self.root.display()))
    }
}

/// Maps a raw `notify` event to the notes it touched
///
/// Only creations and modifications matter; a removed note simply stops
/// drifting the next time it is checked. Renames report the destination.
fn map_notify_event(store: &FsDocumentStore, event: &notify::Event) -> Vec<ResourceRef> {
    let paths: &[PathBuf] = match &event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            &event.paths
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            event.paths.last().map(std::slice::from_ref).unwrap_or_default()
        }
        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            &[]
        }
    };

    paths
        .iter()
        .filter_map(|path| store.reference_for(path))
        .collect()
}

// ============================================================================
// DebouncedRefQueue
// ============================================================================

/// Coalesces repeated modifications of the same note
///
/// Each push resets that note's timer; [`poll`](Self::poll) releases the
/// notes that have been quiet for at least the debounce delay.
#[derive(Debug)]
pub struct DebouncedRefQueue {
    pending: HashMap<ResourceRef, Instant>,
    delay: Duration,
}

impl DebouncedRefQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            delay,
        }
    }

    pub fn push(&mut self, reference: ResourceRef) {
        debug!(reference = %reference, "Enqueuing note modification");
        self.pending.insert(reference, Instant::now());
    }

    /// Removes and returns the settled references, oldest first
    pub fn poll(&mut self) -> Vec<ResourceRef> {
        let now = Instant::now();
        let mut settled: Vec<(ResourceRef, Instant)> = self
            .pending
            .iter()
            .filter(|(_, at)| now.duration_since(**at) >= self.delay)
            .map(|(r, at)| (r.clone(), *at))
            .collect();
        settled.sort_by_key(|(_, at)| *at);

        for (reference, _) in &settled {
            self.pending.remove(reference);
        }
        settled.into_iter().map(|(r, _)| r).collect()
    }

    /// Removes everything still pending, ignoring the delay
    pub fn drain(&mut self) -> Vec<ResourceRef> {
        let mut all: Vec<(ResourceRef, Instant)> = self.pending.drain().collect();
        all.sort_by_key(|(_, at)| *at);
        all.into_iter().map(|(r, _)| r).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Debounces a stream of note references on a background task
///
/// The task ends once `raw` closes, flushing whatever is still pending.
pub fn spawn_debouncer(
    mut raw: mpsc::Receiver<ResourceRef>,
    delay: Duration,
) -> (mpsc::Receiver<ResourceRef>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<ResourceRef>(CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        let mut queue = DebouncedRefQueue::new(delay);
        let tick = (delay / 2).max(Duration::from_millis(10));
        let mut interval = tokio::time::interval(tick);

        loop {
            tokio::select! {
                received = raw.recv() => match received {
                    Some(reference) => queue.push(reference),
                    None => break,
                },
                _ = interval.tick() => {
                    for reference in queue.poll() {
                        if tx.send(reference).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        for reference in queue.drain() {
            if tx.send(reference).await.is_err() {
                return;
            }
        }
        debug!("Note debouncer stopped");
    });

    (rx, handle)
}
