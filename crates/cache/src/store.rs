//! Named caches over a storage backend.
//!
//! Layout, relative to the backend root:
//!
//! ```text
//! folio-core-0.1.0/entries/index.html
//! manual-mb-900/entries/manuals/mb-900/search_index.json
//! manual-mb-900/metadata.json
//! ```

use crate::consts::{ENTRIES_DIR, METADATA_FILE};
use crate::error::{ErrorKind, Result};
use crate::protocol::ManualRecord;
use exn::ResultExt;
use folio_storage::BackendHandle;
use folio_storage::error::ErrorKind as StorageErrorKind;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Clone)]
pub struct CacheStore {
    backend: BackendHandle,
}

impl CacheStore {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    fn entry_path(cache: &str, key: &str) -> PathBuf {
        Path::new(cache).join(ENTRIES_DIR).join(key)
    }

    fn metadata_path(cache: &str) -> PathBuf {
        Path::new(cache).join(METADATA_FILE)
    }

    /// Names of every cache holding at least one file, sorted.
    pub async fn cache_names(&self) -> Result<Vec<String>> {
        let files = self.backend.list(None).await.or_raise(|| ErrorKind::Storage)?;
        let names: BTreeSet<&str> = files
            .iter()
            // Files directly under the root belong to no cache.
            .filter(|file| file.path.components().nth(1).is_some())
            .filter_map(|file| file.root_component())
            .collect();
        Ok(names.into_iter().map(str::to_string).collect())
    }

    pub async fn put(&self, cache: &str, key: &str, body: &[u8]) -> Result<()> {
        self.backend.write(&Self::entry_path(cache, key), body).await.or_raise(|| ErrorKind::Storage)
    }

    pub async fn get(&self, cache: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_optional(&Self::entry_path(cache, key)).await
    }

    pub async fn contains(&self, cache: &str, key: &str) -> Result<bool> {
        self.backend.exists(&Self::entry_path(cache, key)).await.or_raise(|| ErrorKind::Storage)
    }

    /// Find `key` in any cache, trying `preferred` first.
    pub async fn lookup(&self, key: &str, preferred: &str) -> Result<Option<Vec<u8>>> {
        if let Some(body) = self.get(preferred, key).await? {
            return Ok(Some(body));
        }
        for cache in self.cache_names().await? {
            if cache == preferred {
                continue;
            }
            if let Some(body) = self.get(&cache, key).await? {
                return Ok(Some(body));
            }
        }
        Ok(None)
    }

    /// Delete a whole cache. Returns `false` if it did not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, cache: &str) -> Result<bool> {
        let removed = self.backend.delete_prefix(Path::new(cache)).await.or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(removed, "Deleted cache");
        Ok(removed > 0)
    }

    /// Number of resources in a cache, metadata excluded.
    pub async fn entry_count(&self, cache: &str) -> Result<u64> {
        let prefix = Path::new(cache).join(ENTRIES_DIR);
        let files = self.backend.list(Some(&prefix)).await.or_raise(|| ErrorKind::Storage)?;
        Ok(files.len() as u64)
    }

    pub async fn write_metadata(&self, cache: &str, record: &ManualRecord) -> Result<()> {
        let json = serde_json::to_vec(record).or_raise(|| ErrorKind::InvalidData("manual metadata"))?;
        self.backend.write(&Self::metadata_path(cache), &json).await.or_raise(|| ErrorKind::Storage)
    }

    pub async fn read_metadata(&self, cache: &str) -> Result<Option<ManualRecord>> {
        let Some(bytes) = self.read_optional(&Self::metadata_path(cache)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData("manual metadata"))?;
        Ok(Some(record))
    }

    async fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match self.backend.read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => Ok(None),
            Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
        }
    }
}
