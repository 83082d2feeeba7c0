//! wisync Sync - Hierarchy synchronization and change-tracking engine
//!
//! Provides:
//! - Forest construction from flat remote relation data
//! - Baseline snapshots and relationship/content delta tracking
//! - Durable pending changes across restarts
//! - Push with per-item partial-failure accounting
//!
//! ## Modules
//!
//! - [`engine`] - [`SyncEngine`](engine::SyncEngine) owning tree, baseline and deltas
//! - [`tree`] - Arena-backed work item forest
//! - [`tracker`] - Baseline and delta sets
//! - [`pending`] - Pending change snapshot persistence
//! - [`codec`] - YAML front matter note codec
//! - [`documents`] - Filesystem note store (atomic writes)
//! - [`watcher`] - Note watching with debounce
//! - [`memory`] - In-memory storage adapters
//! - [`notifier`] - Log-backed notifications

pub mod codec;
pub mod documents;
pub mod engine;
pub mod memory;
pub mod notifier;
pub mod pending;
pub mod tracker;
pub mod tree;
pub mod watcher;

use thiserror::Error;

use wisync_core::domain::DomainError;

/// Errors surfaced by engine operations
///
/// Per-item push failures are not errors; they are reported in
/// [`PushOutcome`](engine::PushOutcome).
#[derive(Debug, Error)]
pub enum SyncError {
    /// Validation or structural rejection from the domain layer
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// A rebuild was requested while a push is running
    #[error("A push is in progress")]
    PushInProgress,

    /// The remote fetch failed
    #[error("Remote error: {0:#}")]
    Remote(anyhow::Error),

    /// The pending change store could not be read
    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    /// A note could not be written during rebuild
    #[error("Document error: {0:#}")]
    Document(anyhow::Error),
}
