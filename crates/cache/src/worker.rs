//! The cache worker.
//!
//! A [`Worker`] owns the durable caches. Once activated it runs as its own
//! tokio task, answering [`Request`]s that arrive over a channel; every request
//! is handled on a task of its own, so a slow download never blocks a quick
//! listing.

use crate::consts::{
    CORE_CACHE_PREFIX, DEFAULT_CORE_FILES, DEFAULT_FETCH_CONCURRENCY, DEFAULT_RESPONSE_TIMEOUT, IMAGE_SEGMENT,
    LANDING_PAGE, MANUAL_CACHE_PREFIX, MANUAL_CORE_FILES, REQUEST_QUEUE_DEPTH, VERSION_DESCRIPTOR, WORKER_VERSION,
};
use crate::error::{ErrorKind, Result};
use crate::handle::{Envelope, WorkerHandle};
use crate::intercept::Interceptor;
use crate::network::{FetchRequest, NetworkHandle, cache_key};
use crate::protocol::{ManualRecord, Request, Response, VersionCheck, VersionDescriptor};
use crate::registration::WeakRegistration;
use crate::store::CacheStore;
use exn::ResultExt;
use folio_storage::BackendHandle;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Compiled-in version tag, compared against the published descriptor.
    pub version: String,
    /// Shell resources precached into the core cache on install.
    pub core_files: Vec<String>,
    /// Upper bound on concurrent fetches while caching a manual.
    pub fetch_concurrency: usize,
    pub response_timeout: Duration,
    /// Path segment identifying page images.
    pub image_segment: String,
    pub landing_page: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: WORKER_VERSION.to_string(),
            core_files: DEFAULT_CORE_FILES.iter().map(|f| f.to_string()).collect(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            image_segment: IMAGE_SEGMENT.to_string(),
            landing_page: LANDING_PAGE.to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn core_cache_name(&self) -> String {
        format!("{CORE_CACHE_PREFIX}{}", self.version)
    }
}

pub fn manual_cache_name(manual_id: &str) -> String {
    format!("{MANUAL_CACHE_PREFIX}{manual_id}")
}

/// Resources every cached manual holds besides the requested files.
pub fn manual_core_files(manual_id: &str) -> Vec<String> {
    MANUAL_CORE_FILES.iter().map(|file| format!("manuals/{manual_id}/{file}")).collect()
}

fn validate_manual_id(manual_id: &str) -> Result<()> {
    let valid = !manual_id.is_empty()
        && manual_id != "."
        && manual_id != ".."
        && !manual_id.contains(['/', '\\', '?', '#'])
        && !manual_id.chars().any(char::is_control);
    if !valid {
        exn::bail!(ErrorKind::InvalidManualId(manual_id.to_string()));
    }
    Ok(())
}

pub(crate) fn unix_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Clone)]
pub struct Worker {
    pub(crate) config: Arc<WorkerConfig>,
    pub(crate) store: CacheStore,
    pub(crate) network: NetworkHandle,
}

impl Worker {
    pub fn new(config: WorkerConfig, backend: BackendHandle, network: NetworkHandle) -> Self {
        Self {
            config: Arc::new(config),
            store: CacheStore::new(backend),
            network,
        }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Fetch policy for resource requests, sharing this worker's caches.
    pub fn interceptor(&self) -> Interceptor {
        Interceptor::new(self.clone())
    }

    /// Precache the shell resources into the core cache. Resources already
    /// present are not fetched again.
    #[instrument(skip(self), fields(version = %self.config.version))]
    pub async fn install(&self) -> Result<()> {
        let cache = self.config.core_cache_name();
        let mut missing = Vec::new();
        for file in &self.config.core_files {
            let key = cache_key(file);
            if !self.store.contains(&cache, key).await? {
                missing.push(key.to_string());
            }
        }
        self.store_all(&cache, &missing).await?;
        tracing::info!(%cache, fetched = missing.len(), "Worker installed");
        Ok(())
    }

    /// Purge stale caches and start answering requests.
    pub(crate) async fn activate(self, registration: WeakRegistration) -> Result<WorkerHandle> {
        let purged = self.purge_stale_caches().await?;
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let handle = WorkerHandle::new(tx, &self.config.version, self.config.response_timeout);
        tracing::info!(version = %self.config.version, purged, "Worker activated");
        tokio::spawn(self.run(rx, registration));
        Ok(handle)
    }

    /// Delete every cache that is neither the current core cache nor a
    /// manual cache. Manual caches survive version upgrades.
    async fn purge_stale_caches(&self) -> Result<usize> {
        let core = self.config.core_cache_name();
        let mut purged = 0;
        for cache in self.store.cache_names().await? {
            if cache == core || cache.starts_with(MANUAL_CACHE_PREFIX) {
                continue;
            }
            tracing::info!(%cache, "Purging stale cache");
            self.store.delete(&cache).await?;
            purged += 1;
        }
        Ok(purged)
    }

    async fn run(self, mut rx: mpsc::Receiver<Envelope>, registration: WeakRegistration) {
        while let Some(Envelope { request, reply }) = rx.recv().await {
            if request == Request::SkipWaiting {
                registration.skip_waiting();
                continue;
            }
            let worker = self.clone();
            tokio::spawn(async move {
                let response = worker.handle(request).await;
                if let Some(reply) = reply
                    && reply.send(response).is_err()
                {
                    tracing::debug!("Requester went away before the reply");
                }
            });
        }
        tracing::debug!(version = %self.config.version, "Worker stopped");
    }

    /// Answer one request. Failures are reported inside the response.
    #[instrument(skip_all, fields(action = request.action()))]
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::CacheManual { manual_id, files } => match self.cache_manual(&manual_id, &files).await {
                Ok(file_count) => Response {
                    file_count: Some(file_count),
                    ..Response::ok().with_manual(manual_id)
                },
                Err(e) => {
                    tracing::warn!(%manual_id, error = ?e, "Caching manual failed");
                    Response::failed((*e).to_string()).with_manual(manual_id)
                }
            },
            Request::RemoveManual { manual_id } => match self.remove_manual(&manual_id).await {
                Ok(removed) => Response {
                    success: removed,
                    ..Response::default().with_manual(manual_id)
                },
                Err(e) => {
                    tracing::warn!(%manual_id, error = ?e, "Removing manual failed");
                    Response::failed((*e).to_string()).with_manual(manual_id)
                }
            },
            Request::GetOfflineManuals => match self.offline_manuals().await {
                Ok(manuals) => Response {
                    manuals: Some(manuals),
                    ..Response::ok()
                },
                Err(e) => Response::failed((*e).to_string()),
            },
            Request::CheckVersion => match self.check_version().await {
                Ok(check) => Response {
                    has_update: Some(check.has_update),
                    current_version: Some(check.current_version),
                    latest_version: Some(check.latest_version),
                    update_info: Some(check.update_info),
                    ..Response::ok()
                },
                Err(e) => Response {
                    current_version: Some(self.config.version.clone()),
                    ..Response::failed((*e).to_string())
                },
            },
            // Only reachable when handled directly rather than through `run`.
            Request::SkipWaiting => Response::ok(),
        }
    }

    /// Fetch and store a manual's core files plus `files`, then tag the cache
    /// with metadata. Returns the number of files stored.
    ///
    /// The metadata entry is only written once every file is stored, so a
    /// failed download never looks complete.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn cache_manual(&self, manual_id: &str, files: &[String]) -> Result<u64> {
        validate_manual_id(manual_id)?;
        let cache = manual_cache_name(manual_id);

        let core_files = manual_core_files(manual_id);
        let mut seen = HashSet::new();
        let keys: Vec<String> = core_files
            .iter()
            .chain(files)
            .map(|file| cache_key(file))
            .filter(|key| seen.insert(*key))
            .map(str::to_string)
            .collect();

        self.store_all(&cache, &keys).await?;
        let record = ManualRecord {
            id: manual_id.to_string(),
            cached_at: unix_millis(),
            version: self.config.version.clone(),
            file_count: keys.len() as u64,
        };
        self.store.write_metadata(&cache, &record).await?;
        tracing::info!(manual_id, file_count = record.file_count, "Manual cached");
        Ok(record.file_count)
    }

    #[instrument(skip(self))]
    pub async fn remove_manual(&self, manual_id: &str) -> Result<bool> {
        validate_manual_id(manual_id)?;
        self.store.delete(&manual_cache_name(manual_id)).await
    }

    /// Metadata of every manual cache. Caches without metadata read back as
    /// zero-filled records.
    pub async fn offline_manuals(&self) -> Result<Vec<ManualRecord>> {
        let mut manuals = Vec::new();
        for cache in self.store.cache_names().await? {
            let Some(id) = cache.strip_prefix(MANUAL_CACHE_PREFIX) else {
                continue;
            };
            let mut record = self.store.read_metadata(&cache).await?.unwrap_or_default();
            if record.id.is_empty() {
                record.id = id.to_string();
            }
            manuals.push(record);
        }
        Ok(manuals)
    }

    /// Compare the published version descriptor with the compiled-in version.
    #[instrument(skip(self))]
    pub async fn check_version(&self) -> Result<VersionCheck> {
        let path = format!("{VERSION_DESCRIPTOR}?t={}", unix_millis());
        let response = self.network.fetch(&FetchRequest::get(&path)).await?;
        if !response.is_success() {
            exn::bail!(ErrorKind::Fetch {
                path,
                status: response.status
            });
        }
        let info: Value =
            serde_json::from_slice(&response.body).or_raise(|| ErrorKind::InvalidData("version descriptor"))?;
        let descriptor: VersionDescriptor =
            serde_json::from_value(info.clone()).or_raise(|| ErrorKind::InvalidData("version descriptor"))?;
        Ok(VersionCheck {
            has_update: descriptor.version != self.config.version,
            current_version: self.config.version.clone(),
            latest_version: descriptor.version,
            update_info: info,
        })
    }

    /// Fetch every key into `cache`, at most `fetch_concurrency` at a time.
    /// Stops at the first failure; files stored before it are kept.
    async fn store_all(&self, cache: &str, keys: &[String]) -> Result<()> {
        let mut pending: Vec<_> = keys.iter().map(|key| self.store_from_network(cache, key)).collect();
        let mut in_flight = FuturesUnordered::new();
        let initial = self.config.fetch_concurrency.max(1).min(pending.len());
        in_flight.extend(pending.drain(..initial));
        while let Some(result) = in_flight.next().await {
            result?;
            // Keep the queue FIFO.
            if !pending.is_empty() {
                in_flight.push(pending.remove(0));
            }
        }
        Ok(())
    }

    async fn store_from_network(&self, cache: &str, key: &str) -> Result<()> {
        let response = self.network.fetch(&FetchRequest::get(key)).await?;
        if !response.is_success() {
            exn::bail!(ErrorKind::Fetch {
                path: key.to_string(),
                status: response.status
            });
        }
        self.store.put(cache, key, &response.body).await
    }
}
