//! In-memory adapters
//!
//! Process-local implementations of the storage ports, used for ephemeral
//! sessions and as test doubles.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use wisync_core::domain::ResourceRef;
use wisync_core::ports::{IDocumentStore, IKeyValueStore};

/// [`IKeyValueStore`] backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("key-value store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("key-value store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// [`IDocumentStore`] backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<ResourceRef, String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a document, returning its text if it existed
    pub fn remove(&self, reference: &ResourceRef) -> Option<String> {
        self.documents
            .lock()
            .ok()
            .and_then(|mut docs| docs.remove(reference))
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl IDocumentStore for MemoryDocumentStore {
    async fn read(&self, reference: &ResourceRef) -> Result<String> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        documents
            .get(reference)
            .cloned()
            .ok_or_else(|| anyhow!("Document not found: {reference}"))
    }

    async fn write(&self, reference: &ResourceRef, text: &str) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        documents.insert(reference.clone(), text.to_string());
        Ok(())
    }

    async fn exists(&self, reference: &ResourceRef) -> Result<bool> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        Ok(documents.contains_key(reference))
    }

    async fn rename(&self, from: &ResourceRef, to: &ResourceRef) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))?;
        let text = documents
            .remove(from)
            .ok_or_else(|| anyhow!("Document not found: {from}"))?;
        documents.insert(to.clone(), text);
        Ok(())
    }
}
