//! Document store port (driven/secondary port)
//!
//! Every work item may have a backing note, addressed by a [`ResourceRef`]
//! derived from the item's id and title. The store is treated as a
//! single-writer blob store; the engine never holds it across an await
//! beyond a single call.

use crate::domain::ResourceRef;

/// Port trait for the local note storage
#[async_trait::async_trait]
pub trait IDocumentStore: Send + Sync {
    /// Reads the full text of a document
    ///
    /// Returns an error if the document does not exist.
    async fn read(&self, reference: &ResourceRef) -> anyhow::Result<String>;

    /// Writes (creates or replaces) a document
    async fn write(&self, reference: &ResourceRef, text: &str) -> anyhow::Result<()>;

    /// Returns true if the document exists
    async fn exists(&self, reference: &ResourceRef) -> anyhow::Result<bool>;

    /// Moves a document to a new reference, replacing any document there
    ///
    /// Returns an error if `from` does not exist.
    async fn rename(&self, from: &ResourceRef, to: &ResourceRef) -> anyhow::Result<()>;
}
