//! Where a manual's required file list comes from.
//!
//! The authoritative list is derived from the manual's own search index: every
//! distinct page image it references. Only when that artifact cannot be had
//! does the catalog fall back to probing conventionally named page images, a
//! degraded path that is logged as such.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use folio_cache::Interceptor;
use folio_cache::network::FetchRequest;
use folio_search::{SearchIndex, TableOfContents};
use futures::{StreamExt, stream};
use std::collections::HashMap;
use tracing::instrument;

pub const DEFAULT_PROBE_PAGES: u32 = 50;
pub const DEFAULT_PROBE_CONCURRENCY: usize = 6;

/// How a descriptor's file list was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileListOrigin {
    SearchIndex,
    /// Guessed by probing candidate paths.
    Probe,
}

/// The resources a manual needs offline, besides the core files the worker
/// always adds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualDescriptor {
    pub id: String,
    pub files: Vec<String>,
    pub origin: FileListOrigin,
}

#[async_trait]
pub trait ManualSource: Send + Sync {
    async fn descriptor(&self, manual_id: &str) -> Result<ManualDescriptor>;
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Probe bound for manuals without a known page count.
    pub default_probe_pages: u32,
    /// Known page counts, by manual id.
    pub probe_pages: HashMap<String, u32>,
    pub probe_concurrency: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_probe_pages: DEFAULT_PROBE_PAGES,
            probe_pages: HashMap::new(),
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }
}

/// Reads manual artifacts through the worker's fetch policy, so cached
/// manuals stay usable without a network.
#[derive(Clone)]
pub struct ManualCatalog {
    fetcher: Interceptor,
    config: CatalogConfig,
}

/// Path of a manual artifact, relative to the application root.
pub fn artifact_path(manual_id: &str, file: &str) -> String {
    format!("manuals/{manual_id}/{file}")
}

/// Resolve an image path from a manual's index against the application
/// root. Relative paths are relative to the manual's directory.
fn resolve_image(manual_id: &str, path: &str) -> String {
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_string()
    } else if path.starts_with("manuals/") {
        path.to_string()
    } else {
        artifact_path(manual_id, path)
    }
}

impl ManualCatalog {
    pub fn new(fetcher: Interceptor, config: CatalogConfig) -> Self {
        Self { fetcher, config }
    }

    async fn artifact(&self, manual_id: &str, file: &str) -> Result<Vec<u8>> {
        let path = artifact_path(manual_id, file);
        let response = self
            .fetcher
            .fetch(&FetchRequest::get(&path))
            .await
            .or_raise(|| ErrorKind::Catalog(path.clone()))?;
        if !response.is_success() {
            exn::bail!(ErrorKind::Catalog(format!("{path} (HTTP {})", response.status)));
        }
        Ok(response.body)
    }

    #[instrument(skip(self))]
    pub async fn search_index(&self, manual_id: &str) -> Result<SearchIndex> {
        let bytes = self.artifact(manual_id, "search_index.json").await?;
        SearchIndex::from_json(bytes).or_raise(|| ErrorKind::Catalog(artifact_path(manual_id, "search_index.json")))
    }

    #[instrument(skip(self))]
    pub async fn table_of_contents(&self, manual_id: &str) -> Result<TableOfContents> {
        let bytes = self.artifact(manual_id, "toc.json").await?;
        TableOfContents::parse(&bytes).or_raise(|| ErrorKind::Catalog(artifact_path(manual_id, "toc.json")))
    }

    /// Probe `page_001.jpg` up to the manual's page bound, keeping the
    /// candidates that answer successfully.
    async fn probe(&self, manual_id: &str) -> Vec<String> {
        let bound = self.config.probe_pages.get(manual_id).copied().unwrap_or(self.config.default_probe_pages);
        let candidates = (1..=bound).map(|page| artifact_path(manual_id, &format!("images/page_{page:03}.jpg")));
        stream::iter(candidates)
            .map(|path| async move {
                match self.fetcher.fetch(&FetchRequest::get(&path).with_method("HEAD")).await {
                    Ok(response) if response.is_success() => Some(path),
                    _ => None,
                }
            })
            .buffered(self.config.probe_concurrency.max(1))
            .filter_map(|found| async move { found })
            .collect()
            .await
    }
}

#[async_trait]
impl ManualSource for ManualCatalog {
    #[instrument(skip(self))]
    async fn descriptor(&self, manual_id: &str) -> Result<ManualDescriptor> {
        match self.search_index(manual_id).await {
            Ok(index) => Ok(ManualDescriptor {
                id: manual_id.to_string(),
                files: index.image_paths().iter().map(|path| resolve_image(manual_id, path)).collect(),
                origin: FileListOrigin::SearchIndex,
            }),
            Err(e) => {
                let files = self.probe(manual_id).await;
                tracing::warn!(
                    manual_id,
                    degraded = true,
                    found = files.len(),
                    error = ?e,
                    "Search index unavailable, probed for page images"
                );
                Ok(ManualDescriptor {
                    id: manual_id.to_string(),
                    files,
                    origin: FileListOrigin::Probe,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_cache::network::MockNetwork;
    use folio_cache::{Worker, WorkerConfig};
    use folio_storage::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Arc;

    const INDEX: &str = r#"{
        "words": {"motor": [{"pageId": 0, "context": "motor"}]},
        "pages": [
            {"chapter": "1", "page": "1", "imagePath": "images/page_001.jpg"},
            {"chapter": "1", "page": "2", "imagePath": "/manuals/mb/images/page_002.jpg"},
            {"chapter": "1", "page": "3", "imagePath": "images/page_001.jpg"}
        ]
    }"#;

    fn catalog(network: MockNetwork, config: CatalogConfig) -> ManualCatalog {
        let worker = Worker::new(WorkerConfig::default(), Arc::new(MockBackend::default()), Arc::new(network));
        ManualCatalog::new(worker.interceptor(), config)
    }

    #[rstest]
    #[case("images/page_001.jpg", "manuals/mb/images/page_001.jpg")]
    #[case("/shared/logo.png", "shared/logo.png")]
    #[case("manuals/mb/images/page_009.jpg", "manuals/mb/images/page_009.jpg")]
    fn image_paths_resolve_against_manual(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(resolve_image("mb", path), expected);
    }

    #[tokio::test]
    async fn descriptor_comes_from_search_index() {
        let network = MockNetwork::default().with_resource("manuals/mb/search_index.json", INDEX);
        let descriptor = catalog(network, CatalogConfig::default()).descriptor("mb").await.unwrap();
        assert_eq!(descriptor.origin, FileListOrigin::SearchIndex);
        assert_eq!(descriptor.files, vec!["manuals/mb/images/page_001.jpg", "manuals/mb/images/page_002.jpg"]);
    }

    #[tokio::test]
    async fn probing_is_the_fallback() {
        let network = MockNetwork::default()
            .with_resource("manuals/mb/images/page_001.jpg", vec![1])
            .with_resource("manuals/mb/images/page_003.jpg", vec![3])
            .with_resource("manuals/mb/images/page_009.jpg", vec![9]);
        let config = CatalogConfig {
            probe_pages: HashMap::from([("mb".to_string(), 5)]),
            ..CatalogConfig::default()
        };
        let descriptor = catalog(network, config).descriptor("mb").await.unwrap();
        assert_eq!(descriptor.origin, FileListOrigin::Probe);
        // Page 9 lies beyond the configured bound.
        assert_eq!(descriptor.files, vec!["manuals/mb/images/page_001.jpg", "manuals/mb/images/page_003.jpg"]);
    }

    #[tokio::test]
    async fn probe_uses_default_bound() {
        let network = Arc::new(MockNetwork::default());
        let worker = Worker::new(WorkerConfig::default(), Arc::new(MockBackend::default()), network.clone());
        let catalog = ManualCatalog::new(worker.interceptor(), CatalogConfig::default());
        assert!(catalog.descriptor("zz").await.unwrap().files.is_empty());
        let probes = network.requests().await.iter().filter(|p| p.contains("/images/")).count();
        assert_eq!(probes, DEFAULT_PROBE_PAGES as usize);
    }

    #[tokio::test]
    async fn table_of_contents_is_parsed() {
        let network = MockNetwork::default().with_resource("manuals/mb/toc.json", "1;Forord\n4;Motor");
        let toc = catalog(network, CatalogConfig::default()).table_of_contents("mb").await.unwrap();
        assert_eq!(toc.len(), 2);
    }

    #[tokio::test]
    async fn missing_artifact_is_a_catalog_error() {
        let err = catalog(MockNetwork::default(), CatalogConfig::default()).search_index("mb").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Catalog(path) if path.contains("search_index.json")));
    }
}
