//! Filesystem document store (secondary/driven adapter)
//!
//! Implements [`IDocumentStore`] as one markdown file per reference under a
//! notes root, using `tokio::fs`.
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! crash never leaves a half-written note behind.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, instrument};

use wisync_core::domain::ResourceRef;
use wisync_core::ports::IDocumentStore;

/// Adapter mapping [`ResourceRef`]s to files under `root`
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the notes
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a reference to its file path
    ///
    /// References are flat file names; anything that would escape the root
    /// is rejected.
    pub fn path_for(&self, reference: &ResourceRef) -> Result<PathBuf> {
        let relative = Path::new(reference.as_str());
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(relative)),
            _ => bail!("Invalid document reference: {reference}"),
        }
    }

    /// Maps a path seen on disk back to the reference it stores
    ///
    /// Returns `None` for paths outside the root, nested paths, temporary
    /// files and non-markdown files.
    pub fn reference_for(&self, path: &Path) -> Option<ResourceRef> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut components = relative.components();
        let name = match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => name.to_str()?,
            _ => return None,
        };
        name.ends_with(".md").then(|| ResourceRef::from_raw(name))
    }
}

#[async_trait::async_trait]
impl IDocumentStore for FsDocumentStore {
    #[instrument(skip(self), fields(reference = %reference))]
    async fn read(&self, reference: &ResourceRef) -> Result<String> {
        let path = self.path_for(reference)?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        debug!(bytes = text.len(), "document read");
        Ok(text)
    }

    #[instrument(skip(self, text), fields(reference = %reference, bytes = text.len()))]
    async fn write(&self, reference: &ResourceRef, text: &str) -> Result<()> {
        let target = self.path_for(reference)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create notes root: {}", self.root.display()))?;

        let tmp_path = {
            let mut p = target.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        debug!(?tmp_path, "writing to temporary file");
        tokio::fs::write(&tmp_path, text).await?;
        tokio::fs::rename(&tmp_path, &target).await?;

        debug!("write complete");
        Ok(())
    }

    async fn exists(&self, reference: &ResourceRef) -> Result<bool> {
        let path = self.path_for(reference)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(from = %from, to = %to))]
    async fn rename(&self, from: &ResourceRef, to: &ResourceRef) -> Result<()> {
        let source = self.path_for(from)?;
        let target = self.path_for(to)?;
        tokio::fs::rename(&source, &target).await.with_context(|| {
            format!(
                "Failed to move document {} to {}",
                source.display(),
                target.display()
            )
        })?;
        debug!("rename complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let r = ResourceRef::from_raw("12-fix-login.md");

        assert!(!store.exists(&r).await.unwrap());
        store.write(&r, "---\ntitle: x\n---\nbody\n").await.unwrap();
        assert!(store.exists(&r).await.unwrap());
        assert_eq!(store.read(&r).await.unwrap(), "---\ntitle: x\n---\nbody\n");

        store.write(&r, "replaced").await.unwrap();
        assert_eq!(store.read(&r).await.unwrap(), "replaced");
        assert!(!dir.path().join("12-fix-login.md.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("notes");
        let store = FsDocumentStore::new(&root);
        let r = ResourceRef::from_raw("1.md");

        store.write(&r, "x").await.unwrap();
        assert!(root.join("1.md").is_file());
    }

    #[tokio::test]
    async fn test_rename_moves_note() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let old = ResourceRef::from_raw("4-validate-card.md");
        let new = ResourceRef::from_raw("4-validate-payment-card.md");

        store.write(&old, "edited").await.unwrap();
        store.rename(&old, &new).await.unwrap();

        assert!(!store.exists(&old).await.unwrap());
        assert_eq!(store.read(&new).await.unwrap(), "edited");
        assert!(store.rename(&old, &new).await.is_err());
    }

    #[tokio::test]
    async fn test_read_missing_is_error() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(store.read(&ResourceRef::from_raw("404.md")).await.is_err());
    }

    #[test]
    fn test_path_for_rejects_escapes() {
        let store = FsDocumentStore::new("/notes");
        assert!(store.path_for(&ResourceRef::from_raw("../etc/passwd")).is_err());
        assert!(store.path_for(&ResourceRef::from_raw("a/b.md")).is_err());
        assert!(store.path_for(&ResourceRef::from_raw("")).is_err());
        assert_eq!(
            store.path_for(&ResourceRef::from_raw("3-x.md")).unwrap(),
            PathBuf::from("/notes/3-x.md")
        );
    }

    #[test]
    fn test_reference_for() {
        let store = FsDocumentStore::new("/notes");
        assert_eq!(
            store.reference_for(Path::new("/notes/3-x.md")),
            Some(ResourceRef::from_raw("3-x.md"))
        );
        assert_eq!(store.reference_for(Path::new("/notes/3-x.md.tmp")), None);
        assert_eq!(store.reference_for(Path::new("/notes/sub/3-x.md")), None);
        assert_eq!(store.reference_for(Path::new("/elsewhere/3-x.md")), None);
    }
}
