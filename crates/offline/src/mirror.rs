//! Fast local copy of the offline set.
//!
//! Only a cache of the worker's answer: it is read at startup for a quick
//! first render and overwritten on every reconciliation.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use folio_storage::BackendHandle;
use folio_storage::error::ErrorKind as StorageErrorKind;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const DEFAULT_MIRROR_KEY: &str = "offline_manuals.json";

/// A JSON array of manual ids stored under one key.
#[derive(Clone)]
pub struct StorageMirror {
    backend: BackendHandle,
    key: PathBuf,
}

impl StorageMirror {
    pub fn new(backend: BackendHandle) -> Self {
        Self::with_key(backend, DEFAULT_MIRROR_KEY)
    }

    pub fn with_key(backend: BackendHandle, key: impl Into<PathBuf>) -> Self {
        Self { backend, key: key.into() }
    }

    /// A missing mirror is an empty set.
    pub async fn load(&self) -> Result<BTreeSet<String>> {
        let bytes = match self.backend.read(&self.key).await {
            Ok(bytes) => bytes,
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => return Ok(BTreeSet::new()),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Mirror),
        };
        let ids: Vec<String> = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Mirror)?;
        Ok(ids.into_iter().collect())
    }

    pub async fn save(&self, ids: &BTreeSet<String>) -> Result<()> {
        let json = serde_json::to_vec(ids).or_raise(|| ErrorKind::Mirror)?;
        self.backend.write(&self.key, &json).await.or_raise(|| ErrorKind::Mirror)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_storage::StorageBackend;
    use folio_storage::backend::MockBackend;
    use std::path::Path;
    use std::sync::Arc;

    #[tokio::test]
    async fn missing_mirror_is_empty() {
        let mirror = StorageMirror::new(Arc::new(MockBackend::default()));
        assert!(mirror.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn round_trip_as_json_array() {
        let backend = Arc::new(MockBackend::default());
        let mirror = StorageMirror::new(backend.clone());
        let ids: BTreeSet<String> = ["b".to_string(), "a".to_string()].into();
        mirror.save(&ids).await.unwrap();
        assert_eq!(backend.read(Path::new(DEFAULT_MIRROR_KEY)).await.unwrap(), br#"["a","b"]"#);
        assert_eq!(mirror.load().await.unwrap(), ids);
    }

    #[tokio::test]
    async fn corrupt_mirror_is_an_error() {
        let backend = Arc::new(MockBackend::with_files([(DEFAULT_MIRROR_KEY, Vec::from(*b"{}"))]));
        let err = StorageMirror::new(backend).load().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Mirror);
    }
}
