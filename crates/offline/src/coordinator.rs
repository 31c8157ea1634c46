//! The foreground coordinator.
//!
//! Everything the rest of the application does with offline manuals goes
//! through a [`Coordinator`]. It keeps the reconciled offline set, the set of
//! downloads in flight, the last update check and the network status. Every
//! change to that state goes through [`Coordinator::apply`], which also
//! persists the mirror and notifies subscribers, so there is exactly one place
//! where state and what observers see can diverge.

use crate::catalog::ManualSource;
use crate::error::{ErrorKind, Result, from_worker};
use crate::mirror::StorageMirror;
use exn::ResultExt;
use folio_cache::{Registration, WorkerHandle};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::instrument;

pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(5);
/// Readiness allowance on slow or constrained platforms.
pub const CONSTRAINED_READINESS_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_UPDATE_COOLDOWN: Duration = Duration::from_secs(60 * 60);
/// Delay before checking for updates after connectivity returns.
pub const DEFAULT_RECONNECT_CHECK_DELAY: Duration = Duration::from_secs(2);

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub readiness_timeout: Duration,
    pub constrained_readiness_timeout: Duration,
    /// Use the longer readiness allowance.
    pub constrained_platform: bool,
    pub update_cooldown: Duration,
    pub reconnect_check_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            constrained_readiness_timeout: CONSTRAINED_READINESS_TIMEOUT,
            constrained_platform: false,
            update_cooldown: DEFAULT_UPDATE_COOLDOWN,
            reconnect_check_delay: DEFAULT_RECONNECT_CHECK_DELAY,
        }
    }
}

impl CoordinatorConfig {
    pub fn effective_readiness_timeout(&self) -> Duration {
        if self.constrained_platform {
            self.constrained_readiness_timeout
        } else {
            self.readiness_timeout
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Notifications for collaborators (UI indicators, toasts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    OfflineManualsChanged(Vec<String>),
    DownloadStarted(String),
    /// `file_count` is `None` when the download failed.
    DownloadFinished { manual_id: String, file_count: Option<u64> },
    ManualRemoved(String),
    NetworkChanged(NetworkStatus),
    UpdateAvailable { current_version: String, latest_version: String },
    /// Offline support is off for the rest of the session.
    WorkerUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Skipped(SkipReason),
    UpToDate,
    Available { current_version: String, latest_version: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggled {
    Downloaded(u64),
    Removed,
}

/// The offline set as currently known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineSnapshot {
    pub manuals: Vec<String>,
    /// `false` while the set only reflects the local mirror.
    pub reconciled: bool,
}

/// Every way the coordinator's state can change.
#[derive(Debug)]
enum StateChange {
    WorkerUnavailable,
    MirrorLoaded(BTreeSet<String>),
    Reconciled(BTreeSet<String>),
    DownloadStarted(String),
    DownloadFinished { manual_id: String, file_count: Option<u64> },
    Removed(String),
    Network(NetworkStatus),
    UpdateCheckStarted(Instant),
    UpdateFound { current_version: String, latest_version: String },
}

struct State {
    offline: BTreeSet<String>,
    pending: HashSet<String>,
    reconciled: bool,
    worker_available: bool,
    network: NetworkStatus,
    last_update_check: Option<Instant>,
}

struct Inner {
    registration: Registration,
    source: Arc<dyn ManualSource>,
    mirror: StorageMirror,
    config: CoordinatorConfig,
    state: Mutex<State>,
    /// Held while the mirror is written, so writes land in state order.
    persist: tokio::sync::Mutex<()>,
    events: broadcast::Sender<CoordinatorEvent>,
}

/// Service object constructed once at startup and shared by handle.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        registration: Registration,
        source: Arc<dyn ManualSource>,
        mirror: StorageMirror,
        config: CoordinatorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registration,
                source,
                mirror,
                config,
                state: Mutex::new(State {
                    offline: BTreeSet::new(),
                    pending: HashSet::new(),
                    reconciled: false,
                    worker_available: true,
                    network: NetworkStatus::Online,
                    last_update_check: None,
                }),
                persist: tokio::sync::Mutex::new(()),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // State is only mutated in `apply`, which never panics mid-update.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    /// The single place state changes. Returns whether the change took
    /// effect; a download that is already pending, or an update check inside
    /// the cooldown, is refused.
    async fn apply(&self, change: StateChange) -> bool {
        let mut events = Vec::new();
        let mut persist = false;
        let applied = {
            let mut state = self.state();
            match change {
                StateChange::WorkerUnavailable => {
                    let changed = state.worker_available;
                    state.worker_available = false;
                    if changed {
                        events.push(CoordinatorEvent::WorkerUnavailable);
                    }
                    changed
                }
                StateChange::MirrorLoaded(ids) => {
                    // The worker's answer always wins over the mirror.
                    if state.reconciled {
                        return false;
                    }
                    state.offline = ids;
                    events.push(CoordinatorEvent::OfflineManualsChanged(state.offline.iter().cloned().collect()));
                    true
                }
                StateChange::Reconciled(ids) => {
                    state.offline = ids;
                    state.reconciled = true;
                    persist = true;
                    events.push(CoordinatorEvent::OfflineManualsChanged(state.offline.iter().cloned().collect()));
                    true
                }
                StateChange::DownloadStarted(manual_id) => {
                    let started = state.pending.insert(manual_id.clone());
                    if started {
                        events.push(CoordinatorEvent::DownloadStarted(manual_id));
                    }
                    started
                }
                StateChange::DownloadFinished { manual_id, file_count } => {
                    state.pending.remove(&manual_id);
                    if file_count.is_some() && state.offline.insert(manual_id.clone()) {
                        persist = true;
                        events.push(CoordinatorEvent::OfflineManualsChanged(state.offline.iter().cloned().collect()));
                    }
                    events.push(CoordinatorEvent::DownloadFinished { manual_id, file_count });
                    true
                }
                StateChange::Removed(manual_id) => {
                    if state.offline.remove(&manual_id) {
                        persist = true;
                        events.push(CoordinatorEvent::OfflineManualsChanged(state.offline.iter().cloned().collect()));
                    }
                    events.push(CoordinatorEvent::ManualRemoved(manual_id));
                    true
                }
                StateChange::Network(status) => {
                    let changed = state.network != status;
                    state.network = status;
                    if changed {
                        events.push(CoordinatorEvent::NetworkChanged(status));
                    }
                    changed
                }
                StateChange::UpdateCheckStarted(now) => {
                    let cooling = state
                        .last_update_check
                        .is_some_and(|last| now.duration_since(last) < self.inner.config.update_cooldown);
                    if !cooling {
                        state.last_update_check = Some(now);
                    }
                    !cooling
                }
                StateChange::UpdateFound {
                    current_version,
                    latest_version,
                } => {
                    events.push(CoordinatorEvent::UpdateAvailable {
                        current_version,
                        latest_version,
                    });
                    true
                }
            }
        };

        if persist {
            let _writing = self.inner.persist.lock().await;
            // Read the set under the write lock: a change applied while an
            // earlier write was in flight must not be overwritten by it.
            let ids = self.state().offline.clone();
            if let Err(e) = self.inner.mirror.save(&ids).await {
                // The mirror is only a cache of the worker's answer.
                tracing::warn!(error = ?e, "Persisting offline mirror failed");
            }
        }
        for event in events {
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        }
        applied
    }

    /// The active worker, unless offline support is off for this session.
    fn worker(&self) -> Result<WorkerHandle> {
        if !self.state().worker_available {
            exn::bail!(ErrorKind::Unavailable);
        }
        self.inner.registration.controller().ok_or_else(|| exn::Exn::from(ErrorKind::Unavailable))
    }

    /// Load the mirror, wait for the worker, then reconcile against it.
    ///
    /// If no worker becomes ready, offline support is marked unavailable for
    /// the session and the mirror contents stay visible, flagged as
    /// unreconciled.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        match self.inner.mirror.load().await {
            Ok(ids) => {
                self.apply(StateChange::MirrorLoaded(ids)).await;
            }
            Err(e) => tracing::warn!(error = ?e, "Ignoring unreadable offline mirror"),
        }

        let timeout = self.inner.config.effective_readiness_timeout();
        if let Err(e) = self.inner.registration.ready(timeout).await {
            tracing::warn!(error = ?e, "Worker unavailable; offline features disabled");
            self.apply(StateChange::WorkerUnavailable).await;
            return Err(e).or_raise(|| ErrorKind::Unavailable);
        }
        self.reconcile().await
    }

    /// Replace the offline set (and the mirror) with the worker's answer.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<()> {
        let worker = self.worker()?;
        let records = from_worker(worker.offline_manuals().await)?;
        let ids: BTreeSet<String> =
            records.into_iter().filter(|record| record.is_complete()).map(|record| record.id).collect();
        tracing::info!(manuals = ids.len(), "Reconciled offline manuals");
        self.apply(StateChange::Reconciled(ids)).await;
        Ok(())
    }

    /// Download a manual for offline use. Returns the number of files cached.
    ///
    /// Fails fast, without side effects, when offline support is unavailable
    /// or a download of the same manual is already running.
    #[instrument(skip(self))]
    pub async fn download_manual(&self, manual_id: &str) -> Result<u64> {
        let worker = self.worker()?;
        if !self.apply(StateChange::DownloadStarted(manual_id.to_string())).await {
            exn::bail!(ErrorKind::DownloadPending(manual_id.to_string()));
        }

        let result = self.fetch_and_cache(&worker, manual_id).await;
        self.apply(StateChange::DownloadFinished {
            manual_id: manual_id.to_string(),
            file_count: result.as_ref().ok().copied(),
        })
        .await;
        match &result {
            Ok(file_count) => tracing::info!(file_count, "Manual available offline"),
            Err(e) => tracing::warn!(error = ?e, "Manual download failed"),
        }
        result
    }

    async fn fetch_and_cache(&self, worker: &WorkerHandle, manual_id: &str) -> Result<u64> {
        let descriptor = self.inner.source.descriptor(manual_id).await?;
        from_worker(worker.cache_manual(manual_id, descriptor.files).await)
    }

    /// Remove a manual from offline storage. Returns `false` if the worker
    /// had nothing cached for it.
    #[instrument(skip(self))]
    pub async fn remove_manual(&self, manual_id: &str) -> Result<bool> {
        let worker = self.worker()?;
        if self.is_pending(manual_id) {
            exn::bail!(ErrorKind::DownloadPending(manual_id.to_string()));
        }
        let removed = from_worker(worker.remove_manual(manual_id).await)?;
        self.apply(StateChange::Removed(manual_id.to_string())).await;
        Ok(removed)
    }

    pub async fn toggle_offline_status(&self, manual_id: &str) -> Result<Toggled> {
        if self.is_offline(manual_id) {
            self.remove_manual(manual_id).await?;
            Ok(Toggled::Removed)
        } else {
            self.download_manual(manual_id).await.map(Toggled::Downloaded)
        }
    }

    /// Ask the worker whether a newer version is published.
    ///
    /// Runs at most once per cooldown window, and only while online.
    #[instrument(skip(self))]
    pub async fn check_for_update(&self) -> Result<UpdateStatus> {
        if self.network_status() == NetworkStatus::Offline {
            return Ok(UpdateStatus::Skipped(SkipReason::Offline));
        }
        let worker = self.worker()?;
        if !self.apply(StateChange::UpdateCheckStarted(Instant::now())).await {
            tracing::debug!("Update check skipped, cooling down");
            return Ok(UpdateStatus::Skipped(SkipReason::Cooldown));
        }

        let check = from_worker(worker.check_version().await)?;
        if !check.has_update {
            return Ok(UpdateStatus::UpToDate);
        }
        tracing::info!(current = %check.current_version, latest = %check.latest_version, "Update available");
        self.apply(StateChange::UpdateFound {
            current_version: check.current_version.clone(),
            latest_version: check.latest_version.clone(),
        })
        .await;
        Ok(UpdateStatus::Available {
            current_version: check.current_version,
            latest_version: check.latest_version,
        })
    }

    /// Record a connectivity change. Regaining connectivity schedules an
    /// update check after a short delay.
    pub async fn set_network_status(&self, status: NetworkStatus) {
        let changed = self.apply(StateChange::Network(status)).await;
        if !changed || status != NetworkStatus::Online {
            return;
        }
        let coordinator = self.clone();
        let delay = self.inner.config.reconnect_check_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = coordinator.check_for_update().await {
                tracing::debug!(error = ?e, "Update check after reconnect failed");
            }
        });
    }

    /// Tell the waiting worker (if any) to take over.
    pub async fn activate_update(&self) -> Result<()> {
        let worker = self.worker()?;
        from_worker(worker.skip_waiting().await)
    }

    /// Only a reconciled set counts; mirror contents alone never make a
    /// manual offline.
    pub fn is_offline(&self, manual_id: &str) -> bool {
        let state = self.state();
        state.reconciled && state.offline.contains(manual_id)
    }

    pub fn is_pending(&self, manual_id: &str) -> bool {
        self.state().pending.contains(manual_id)
    }

    /// Whether offline operations can be attempted at all.
    pub fn is_available(&self) -> bool {
        self.state().worker_available && self.inner.registration.controller().is_some()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.state().network
    }

    pub fn offline_manuals(&self) -> OfflineSnapshot {
        let state = self.state();
        OfflineSnapshot {
            manuals: state.offline.iter().cloned().collect(),
            reconciled: state.reconciled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogConfig, ManualCatalog};
    use crate::mirror::DEFAULT_MIRROR_KEY;
    use folio_cache::network::MockNetwork;
    use folio_cache::{DEFAULT_CORE_FILES, Worker, WorkerConfig};
    use folio_storage::backend::MockBackend;
    use folio_storage::{BackendHandle, StorageBackend};
    use folio_storage::FileInfo;
    use folio_storage::error::Result as StorageResult;
    use futures::Stream;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::pin::Pin;
    use tokio::sync::broadcast::Receiver;

    /// Memory backend whose writes take the scripted durations, in order.
    struct SlowWrites {
        inner: MockBackend,
        delays: Mutex<VecDeque<Duration>>,
    }

    impl SlowWrites {
        fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
            Self {
                inner: MockBackend::default(),
                delays: Mutex::new(delays.into_iter().collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl StorageBackend for SlowWrites {
        fn name(&self) -> &str {
            "slow"
        }

        fn list_stream<'a>(
            &'a self,
            prefix: Option<&'a Path>,
        ) -> Pin<Box<dyn Stream<Item = StorageResult<FileInfo>> + Send + 'a>> {
            self.inner.list_stream(prefix)
        }

        async fn exists(&self, path: &Path) -> StorageResult<bool> {
            self.inner.exists(path).await
        }

        async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
            let delay = self.delays.lock().unwrap().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.write(path, data).await
        }

        async fn delete(&self, path: &Path) -> StorageResult<()> {
            self.inner.delete(path).await
        }
    }

    const INDEX: &str = r#"{
        "words": {"motor": [{"pageId": 0, "context": "motor"}]},
        "pages": [
            {"chapter": "1", "page": "1", "imagePath": "images/page_001.jpg"},
            {"chapter": "1", "page": "2", "imagePath": "images/page_002.jpg"},
            {"chapter": "2", "page": "3", "imagePath": "images/page_003.jpg"}
        ]
    }"#;

    fn site() -> MockNetwork {
        MockNetwork::default()
            .with_resources(DEFAULT_CORE_FILES.iter().map(|f| (*f, "shell")))
            .with_resource("manuals/mb/index.html", "<html>")
            .with_resource("manuals/mb/search_index.json", INDEX)
            .with_resource("manuals/mb/toc.json", "1;Forord")
            .with_resource("manuals/mb/images/page_001.jpg", vec![1])
            .with_resource("manuals/mb/images/page_002.jpg", vec![2])
            .with_resource("manuals/mb/images/page_003.jpg", vec![3])
            .with_resource("version.json", r#"{"version":"9"}"#)
    }

    struct Fixture {
        coordinator: Coordinator,
        network: Arc<MockNetwork>,
        state: Arc<MockBackend>,
    }

    fn quick() -> CoordinatorConfig {
        CoordinatorConfig {
            readiness_timeout: Duration::from_millis(50),
            reconnect_check_delay: Duration::from_millis(10),
            ..CoordinatorConfig::default()
        }
    }

    async fn fixture_with(network: MockNetwork, caches: BackendHandle, state: Arc<MockBackend>) -> Fixture {
        let network = Arc::new(network);
        let worker = Worker::new(WorkerConfig::default(), caches, network.clone());
        let catalog = ManualCatalog::new(worker.interceptor(), CatalogConfig::default());
        let registration = Registration::new();
        registration.register(worker).await.unwrap();
        let coordinator = Coordinator::new(registration, Arc::new(catalog), StorageMirror::new(state.clone()), quick());
        coordinator.start().await.unwrap();
        Fixture {
            coordinator,
            network,
            state,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(site(), Arc::new(MockBackend::default()), Arc::new(MockBackend::default())).await
    }

    fn drain(rx: &mut Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    async fn mirror_contents(state: &MockBackend) -> Vec<u8> {
        state.read(Path::new(DEFAULT_MIRROR_KEY)).await.unwrap()
    }

    #[tokio::test]
    async fn download_caches_core_files_and_images() {
        let f = fixture().await;
        let mut events = f.coordinator.subscribe();

        assert_eq!(f.coordinator.download_manual("mb").await.unwrap(), 6);
        assert!(f.coordinator.is_offline("mb"));
        assert!(!f.coordinator.is_pending("mb"));
        assert_eq!(mirror_contents(&f.state).await, br#"["mb"]"#);
        assert_eq!(
            drain(&mut events),
            vec![
                CoordinatorEvent::DownloadStarted("mb".to_string()),
                CoordinatorEvent::OfflineManualsChanged(vec!["mb".to_string()]),
                CoordinatorEvent::DownloadFinished {
                    manual_id: "mb".to_string(),
                    file_count: Some(6)
                },
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_download_of_same_manual_is_refused() {
        let f = fixture().await;
        let (first, second) = tokio::join!(f.coordinator.download_manual("mb"), f.coordinator.download_manual("mb"));
        assert_eq!(first.unwrap(), 6);
        assert_eq!(*second.unwrap_err(), ErrorKind::DownloadPending("mb".to_string()));
        // Only one request reached the worker.
        assert_eq!(f.network.request_count("manuals/mb/index.html").await, 1);
    }

    #[tokio::test]
    async fn remove_while_downloading_is_refused() {
        let f = fixture().await;
        let (download, remove) = tokio::join!(f.coordinator.download_manual("mb"), f.coordinator.remove_manual("mb"));
        assert!(download.is_ok());
        assert_eq!(*remove.unwrap_err(), ErrorKind::DownloadPending("mb".to_string()));
        assert!(f.coordinator.is_offline("mb"));
    }

    #[tokio::test]
    async fn remove_updates_set_and_mirror() {
        let f = fixture().await;
        f.coordinator.download_manual("mb").await.unwrap();
        assert!(f.coordinator.remove_manual("mb").await.unwrap());
        assert!(!f.coordinator.is_offline("mb"));
        assert_eq!(mirror_contents(&f.state).await, b"[]");
        // Nothing left to remove.
        assert!(!f.coordinator.remove_manual("mb").await.unwrap());
    }

    #[tokio::test]
    async fn toggle_downloads_then_removes() {
        let f = fixture().await;
        assert_eq!(f.coordinator.toggle_offline_status("mb").await.unwrap(), Toggled::Downloaded(6));
        assert_eq!(f.coordinator.toggle_offline_status("mb").await.unwrap(), Toggled::Removed);
        assert!(f.coordinator.offline_manuals().manuals.is_empty());
    }

    #[tokio::test]
    async fn failed_download_clears_pending() {
        let network = site();
        network.remove("manuals/mb/images/page_002.jpg").await;
        let f = fixture_with(network, Arc::new(MockBackend::default()), Arc::new(MockBackend::default())).await;
        let mut events = f.coordinator.subscribe();

        let err = f.coordinator.download_manual("mb").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Worker(_)));
        assert!(!f.coordinator.is_pending("mb"));
        assert!(!f.coordinator.is_offline("mb"));
        assert_eq!(
            drain(&mut events).last(),
            Some(&CoordinatorEvent::DownloadFinished {
                manual_id: "mb".to_string(),
                file_count: None
            })
        );
        // A retry is allowed once the failure is reported.
        f.network.insert("manuals/mb/images/page_002.jpg", vec![2]).await;
        assert_eq!(f.coordinator.download_manual("mb").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn worker_answer_overwrites_mirror() {
        let caches: BackendHandle = Arc::new(MockBackend::with_files([
            ("manual-mb/metadata.json", Vec::from(*br#"{"id":"mb","cachedAt":1,"version":"1","fileCount":4}"#)),
            ("manual-mb/entries/manuals/mb/index.html", Vec::from(*b"x")),
            // Interrupted download: entries but no metadata.
            ("manual-half/entries/manuals/half/index.html", Vec::from(*b"x")),
        ]));
        let state = Arc::new(MockBackend::with_files([(DEFAULT_MIRROR_KEY, Vec::from(*br#"["stale"]"#))]));
        let f = fixture_with(site(), caches, state).await;

        let snapshot = f.coordinator.offline_manuals();
        assert_eq!(snapshot.manuals, vec!["mb"]);
        assert!(snapshot.reconciled);
        assert_eq!(mirror_contents(&f.state).await, br#"["mb"]"#);
    }

    #[tokio::test]
    async fn without_worker_mirror_is_shown_unreconciled() {
        let state = Arc::new(MockBackend::with_files([(DEFAULT_MIRROR_KEY, Vec::from(*br#"["mb"]"#))]));
        let network = Arc::new(site());
        let registration = Registration::new();
        let worker = Worker::new(WorkerConfig::default(), Arc::new(MockBackend::default()), network);
        let catalog = ManualCatalog::new(worker.interceptor(), CatalogConfig::default());
        let coordinator = Coordinator::new(registration.clone(), Arc::new(catalog), StorageMirror::new(state), quick());

        let err = coordinator.start().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Unavailable);
        let snapshot = coordinator.offline_manuals();
        assert_eq!(snapshot.manuals, vec!["mb"]);
        assert!(!snapshot.reconciled);
        assert!(!coordinator.is_offline("mb"));

        // Unavailability lasts for the session, even if a worker shows up late.
        registration.register(worker).await.unwrap();
        assert!(!coordinator.is_available());
        assert_eq!(*coordinator.download_manual("mb").await.unwrap_err(), ErrorKind::Unavailable);
        assert!(!coordinator.is_pending("mb"));
    }

    #[tokio::test]
    async fn mirror_only_manuals_are_not_offline_before_reconciling() {
        let state = Arc::new(MockBackend::with_files([(DEFAULT_MIRROR_KEY, Vec::from(*br#"["mb"]"#))]));
        let worker = Worker::new(WorkerConfig::default(), Arc::new(MockBackend::default()), Arc::new(site()));
        let catalog = ManualCatalog::new(worker.interceptor(), CatalogConfig::default());
        let registration = Registration::new();
        let config = CoordinatorConfig {
            readiness_timeout: Duration::from_secs(1),
            ..quick()
        };
        let coordinator = Coordinator::new(registration.clone(), Arc::new(catalog), StorageMirror::new(state), config);

        // Mirror loaded, worker not ready yet.
        let starting = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.start().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(coordinator.offline_manuals().manuals, vec!["mb"]);
        assert!(!coordinator.is_offline("mb"));

        // The worker has nothing cached, so reconciling drops the mirror entry.
        registration.register(worker).await.unwrap();
        starting.await.unwrap().unwrap();
        assert!(coordinator.offline_manuals().reconciled);
        assert!(!coordinator.is_offline("mb"));
    }

    #[tokio::test]
    async fn mirror_writes_land_in_state_order() {
        let state = Arc::new(SlowWrites::new([Duration::from_millis(50)]));
        let worker = Worker::new(WorkerConfig::default(), Arc::new(MockBackend::default()), Arc::new(site()));
        let catalog = ManualCatalog::new(worker.interceptor(), CatalogConfig::default());
        let coordinator =
            Coordinator::new(Registration::new(), Arc::new(catalog), StorageMirror::new(state.clone()), quick());

        let finished = |id: &str| StateChange::DownloadFinished {
            manual_id: id.to_string(),
            file_count: Some(1),
        };
        // The first write is slow; the second change must not be lost to it.
        tokio::join!(coordinator.apply(finished("a")), coordinator.apply(finished("b")));
        let expected: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
        assert_eq!(StorageMirror::new(state).load().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn update_checks_respect_cooldown() {
        let f = fixture().await;
        assert_eq!(
            f.coordinator.check_for_update().await.unwrap(),
            UpdateStatus::Available {
                current_version: folio_cache::WORKER_VERSION.to_string(),
                latest_version: "9".to_string()
            }
        );
        assert_eq!(
            f.coordinator.check_for_update().await.unwrap(),
            UpdateStatus::Skipped(SkipReason::Cooldown)
        );
        assert_eq!(f.network.request_count("version.json").await, 1);
    }

    #[tokio::test]
    async fn update_check_is_skipped_offline() {
        let f = fixture().await;
        f.coordinator.set_network_status(NetworkStatus::Offline).await;
        assert_eq!(
            f.coordinator.check_for_update().await.unwrap(),
            UpdateStatus::Skipped(SkipReason::Offline)
        );
        assert_eq!(f.network.request_count("version.json").await, 0);
    }

    #[tokio::test]
    async fn reconnecting_schedules_an_update_check() {
        let f = fixture().await;
        f.coordinator.set_network_status(NetworkStatus::Offline).await;
        let mut events = f.coordinator.subscribe();
        f.coordinator.set_network_status(NetworkStatus::Online).await;

        let update = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(CoordinatorEvent::UpdateAvailable { latest_version, .. }) = events.recv().await {
                    return latest_version;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(update, "9");
    }

    #[tokio::test]
    async fn repeated_status_is_not_a_change() {
        let f = fixture().await;
        let mut events = f.coordinator.subscribe();
        f.coordinator.set_network_status(NetworkStatus::Online).await;
        assert!(drain(&mut events).is_empty());
        f.coordinator.set_network_status(NetworkStatus::Offline).await;
        assert_eq!(drain(&mut events), vec![CoordinatorEvent::NetworkChanged(NetworkStatus::Offline)]);
    }

    #[tokio::test]
    async fn activating_update_promotes_waiting_worker() {
        let caches: BackendHandle = Arc::new(MockBackend::default());
        let network = Arc::new(site());
        let registration = Registration::new();
        let current = Worker::new(WorkerConfig::default(), caches.clone(), network.clone());
        let catalog = ManualCatalog::new(current.interceptor(), CatalogConfig::default());
        registration.register(current).await.unwrap();
        let next = WorkerConfig {
            version: "9".to_string(),
            ..WorkerConfig::default()
        };
        registration.register(Worker::new(next, caches, network)).await.unwrap();

        let state = Arc::new(MockBackend::default());
        let coordinator = Coordinator::new(registration.clone(), Arc::new(catalog), StorageMirror::new(state), quick());
        coordinator.start().await.unwrap();
        let mut changes = registration.subscribe();
        coordinator.activate_update().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), changes.changed()).await.unwrap().unwrap();
        assert_eq!(registration.controller().unwrap().version(), "9");
    }

    #[test]
    fn constrained_platforms_wait_longer() {
        let config = CoordinatorConfig {
            constrained_platform: true,
            ..CoordinatorConfig::default()
        };
        assert_eq!(config.effective_readiness_timeout(), CONSTRAINED_READINESS_TIMEOUT);
        assert_eq!(CoordinatorConfig::default().effective_readiness_timeout(), DEFAULT_READINESS_TIMEOUT);
    }
}
