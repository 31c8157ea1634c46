//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface over the places folio persists bytes (the local filesystem in
//! production, memory in tests).

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All operations are asynchronous. All paths are relative to the storage
/// root and are validated using [`validate_path`](crate::validate_path)
/// by every implementation before use.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use folio_storage::{backend::StorageBackend, error::Result};
///
/// async fn metadata_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("manual-a/metadata.json");
///     if backend.exists(path).await? {
///         Ok(backend.read(path).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// Prefix matching is component-based: the prefix `manual-a` matches
    /// `manual-a/metadata.json` but not `manual-ab/metadata.json`. Listing a
    /// prefix that does not exist yields an empty stream, not an error.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, creating or overwriting the file. Parent
    /// directories are created as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Delete every file below `prefix`, returning how many were removed.
    ///
    /// Deleting a prefix with nothing under it removes nothing and returns
    /// zero.
    async fn delete_prefix(&self, prefix: &Path) -> Result<u64> {
        let files = self.list(Some(prefix)).await?;
        let mut removed = 0;
        for file in files {
            self.delete(&file.path).await?;
            removed += 1;
        }
        Ok(removed)
    }
}
