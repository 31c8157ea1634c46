//! Local filesystem storage backend.
//!
//! Files are stored below a configured directory and accessed through
//! `tokio::fs`.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use folio_storage::backend::LocalBackend;
///
/// let backend = LocalBackend::new("offline", "/var/lib/folio/offline");
/// assert!(backend.is_ok());
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, is not a directory, or
    /// cannot be created.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Non-async on purpose: happens once at startup.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Errors can't be `?`-ed inside the listing stream, so the per-entry
    /// work lives here and the stream yields whatever comes back.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            // Descend into directories that could still contain matches.
            if let Some(pfx) = prefix
                && !relative.starts_with(pfx)
                && !pfx.starts_with(&relative)
            {
                return Ok(WalkEntry::Skip);
            }
            return Ok(WalkEntry::Descend(path));
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete_prefix(&self, prefix: &Path) -> Result<u64> {
        let removed = self.list(Some(prefix)).await?.len() as u64;
        let abs_path = self.absolute_path(prefix)?;
        match fs::metadata(&abs_path).await {
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, prefix))?;
            },
            Ok(_) => fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, prefix))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => exn::bail!(Self::map_io_error(e, prefix)),
        }
        tracing::debug!(backend = %self.name, prefix = %prefix.display(), removed, "Deleted prefix");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
    }

    #[test]
    fn test_absolute_path_prevents_traversal() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("manual-a/metadata.json");
        assert_eq!(backend.absolute_path("manual-a/metadata.json").unwrap(), expected);
        assert!(backend.absolute_path("../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_write_creates_directories_and_reads_back() {
        let (_dir, backend) = backend();
        backend.write(Path::new("manual-a/entries/manuals/a/index.html"), b"<html>").await.unwrap();
        assert!(backend.exists(Path::new("manual-a/entries/manuals/a/index.html")).await.unwrap());
        assert_eq!(backend.read(Path::new("manual-a/entries/manuals/a/index.html")).await.unwrap(), b"<html>");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, backend) = backend();
        let err = backend.delete(Path::new("nope.json")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_prefix_is_component_based() {
        let (_dir, backend) = backend();
        backend.write(Path::new("manual-a/metadata.json"), b"{}").await.unwrap();
        backend.write(Path::new("manual-a/entries/x.jpg"), b"x").await.unwrap();
        backend.write(Path::new("manual-ab/metadata.json"), b"{}").await.unwrap();
        let files = backend.list(Some(Path::new("manual-a"))).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.path.starts_with("manual-a")));
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix_is_empty() {
        let (_dir, backend) = backend();
        assert!(backend.list(Some(Path::new("manual-zzz"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_tree() {
        let (_dir, backend) = backend();
        backend.write(Path::new("manual-a/metadata.json"), b"{}").await.unwrap();
        backend.write(Path::new("manual-a/entries/manuals/a/images/p1.jpg"), b"x").await.unwrap();
        backend.write(Path::new("manual-b/metadata.json"), b"{}").await.unwrap();
        assert_eq!(backend.delete_prefix(Path::new("manual-a")).await.unwrap(), 2);
        assert!(backend.list(Some(Path::new("manual-a"))).await.unwrap().is_empty());
        assert_eq!(backend.list(None).await.unwrap().len(), 1);
        assert_eq!(backend.delete_prefix(Path::new("manual-a")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_listing_reports_relative_paths_and_sizes() {
        let (_dir, backend) = backend();
        backend.write(Path::new("offline_manuals.json"), b"[\"a\"]").await.unwrap();
        let files = backend.list(None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("offline_manuals.json"));
        assert_eq!(files[0].size, 5);
    }
}
