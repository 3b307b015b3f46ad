//! Object-store seam for raw document bytes.
//!
//! The engine treats document fetching as an external collaborator: a
//! listing of named objects with etags, plus a byte fetch. The filesystem
//! implementation backs the CLI.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// A listed object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object name (canonical document path).
    pub name: String,
    /// Source etag, when available.
    pub etag: Option<String>,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification instant.
    pub updated: DateTime<Utc>,
}

/// A fetched object payload.
#[derive(Debug, Clone)]
pub struct ObjectPayload {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// Source etag, when available.
    pub etag: Option<String>,
    /// Last modification instant.
    pub modified: DateTime<Utc>,
}

/// Source of raw markdown documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists objects under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Fetches an object's bytes.
    async fn get(&self, name: &str) -> Result<ObjectPayload>;
}

/// Filesystem-backed object store rooted at a directory.
///
/// Object names are paths relative to the root with `/` separators; only
/// `.md` files are listed.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn modified_of(meta: &std::fs::Metadata) -> DateTime<Utc> {
        meta.modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut infos = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                Error::Dependency(format!("object store list {}: {e}", dir.display()))
            })?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let name = self.relative_name(&path);
                if !name.starts_with(prefix) {
                    continue;
                }
                // Filesystems have no etags; the mtime stands in.
                let updated = Self::modified_of(&meta);
                infos.push(ObjectInfo {
                    name,
                    etag: Some(format!("{}-{}", meta.len(), updated.timestamp())),
                    size: meta.len(),
                    updated,
                });
            }
        }

        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn get(&self, name: &str) -> Result<ObjectPayload> {
        let path = self.root.join(name);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| Error::not_found(format!("object {name}")))?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Dependency(format!("object store get {name}: {e}")))?;
        let modified = Self::modified_of(&meta);
        Ok(ObjectPayload {
            bytes,
            etag: Some(format!("{}-{}", meta.len(), modified.timestamp())),
            modified,
        })
    }
}
