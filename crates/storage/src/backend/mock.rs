//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// In-memory storage backend for testing.
///
/// Files live in a `HashMap` behind a [`RwLock`], so all trait methods can
/// operate on `&self`.
///
/// # Examples
///
/// ```
/// use folio_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MockBackend::with_files([("offline_manuals.json", b"[]")]);
/// assert!(backend.exists(Path::new("offline_manuals.json")).await.unwrap());
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then
    /// the test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
        }
    }

    /// Number of files currently stored.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let entries: Vec<(PathBuf, UtcDateTime, u64)> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (inserted, data))| (path.clone(), *inserted, data.len() as u64))
                    .collect()
            };
            for (path, inserted, size) in entries {
                yield Ok(FileInfo::new(path, size, inserted));
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn delete_prefix(&self, prefix: &Path) -> Result<u64> {
        let prefix = validate_path(prefix)?;
        let mut guard = self.storage.write().await;
        let before = guard.len();
        guard.retain(|path, _| !path.starts_with(&prefix));
        Ok((before - guard.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("manual-a/metadata.json"), b"{}").await.unwrap();
        assert_eq!(backend.read(Path::new("manual-a/metadata.json")).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.json")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let backend = MockBackend::with_files([
            ("manual-a/metadata.json", Vec::from(*b"{}")),
            ("manual-a/entries/p1.jpg", Vec::from(*b"x")),
            ("manual-ab/metadata.json", Vec::from(*b"{}")),
        ]);
        assert_eq!(backend.delete_prefix(Path::new("manual-a")).await.unwrap(), 2);
        assert_eq!(backend.len().await, 1);
        assert!(backend.exists(Path::new("manual-ab/metadata.json")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("manual-a/metadata.json", Vec::from(*b"a")),
            ("manual-a/entries/x", Vec::from(*b"b")),
            ("folio-core-1/entries/index.html", Vec::from(*b"c")),
        ]);
        let files = backend.list(Some(Path::new("manual-a"))).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_contents() {
        let backend = MockBackend::default();
        backend.write(Path::new("offline_manuals.json"), b"[\"a\"]").await.unwrap();
        backend.write(Path::new("offline_manuals.json"), b"[]").await.unwrap();
        assert_eq!(backend.read(Path::new("offline_manuals.json")).await.unwrap(), b"[]");
        assert_eq!(backend.list(None).await.unwrap()[0].size, 2);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}
