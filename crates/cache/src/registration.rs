//! Worker lifecycle: install, wait, activate.
//!
//! A new worker is installed (core shell precached) and then either activated
//! straight away, when nothing is active yet, or parked as the waiting worker
//! until someone asks it to skip waiting. Activation purges stale caches.

use crate::error::{ErrorKind, Result};
use crate::handle::WorkerHandle;
use crate::worker::Worker;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::instrument;

/// Where a registered worker ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The worker is now the active one.
    Activated,
    /// Another worker is active; this one waits for `skip-waiting`.
    Waiting,
    /// A worker of the same version is already active.
    AlreadyActive,
}

struct Inner {
    waiting: Mutex<Option<Worker>>,
    controller: watch::Sender<Option<WorkerHandle>>,
}

/// Cheap, cloneable registration shared by everyone who talks to the worker.
#[derive(Clone)]
pub struct Registration {
    inner: Arc<Inner>,
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration {
    pub fn new() -> Self {
        let (controller, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                waiting: Mutex::new(None),
                controller,
            }),
        }
    }

    /// Install `worker` and activate it if nothing is active yet.
    #[instrument(skip_all, fields(version = worker.version()))]
    pub async fn register(&self, worker: Worker) -> Result<Lifecycle> {
        let mut waiting = self.inner.waiting.lock().await;
        if let Some(active) = self.controller()
            && active.version() == worker.version()
        {
            return Ok(Lifecycle::AlreadyActive);
        }

        worker.install().await?;
        if self.controller().is_none() {
            let handle = worker.activate(self.downgrade()).await?;
            self.inner.controller.send_replace(Some(handle));
            return Ok(Lifecycle::Activated);
        }
        tracing::info!("Worker installed and waiting");
        *waiting = Some(worker);
        Ok(Lifecycle::Waiting)
    }

    /// Promote the waiting worker, superseding the active one. Returns
    /// `false` when nothing is waiting.
    #[instrument(skip(self))]
    pub async fn skip_waiting(&self) -> Result<bool> {
        let Some(worker) = self.inner.waiting.lock().await.take() else {
            return Ok(false);
        };
        let handle = worker.activate(self.downgrade()).await?;
        // Dropping the old handle lets the superseded worker wind down once
        // nobody else holds it.
        self.inner.controller.send_replace(Some(handle));
        Ok(true)
    }

    /// The active worker, if any.
    pub fn controller(&self) -> Option<WorkerHandle> {
        self.inner.controller.borrow().clone()
    }

    pub async fn waiting_version(&self) -> Option<String> {
        self.inner.waiting.lock().await.as_ref().map(|worker| worker.version().to_string())
    }

    /// Wait until a worker is active.
    pub async fn ready(&self, timeout: Duration) -> Result<WorkerHandle> {
        let mut rx = self.inner.controller.subscribe();
        let Ok(result) = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await else {
            tracing::warn!(?timeout, "No worker became active");
            exn::bail!(ErrorKind::NotReady);
        };
        let active = result.map_err(|_| exn::Exn::from(ErrorKind::WorkerStopped))?;
        active.clone().ok_or_else(|| exn::Exn::from(ErrorKind::NotReady))
    }

    /// Watch the active worker change.
    pub fn subscribe(&self) -> watch::Receiver<Option<WorkerHandle>> {
        self.inner.controller.subscribe()
    }

    pub(crate) fn downgrade(&self) -> WeakRegistration {
        WeakRegistration(Arc::downgrade(&self.inner))
    }
}

/// Link from a running worker back to its registration. Weak, so a worker
/// task never keeps the registration alive.
#[derive(Clone)]
pub(crate) struct WeakRegistration(Weak<Inner>);

impl WeakRegistration {
    /// Promote the waiting worker in the background.
    pub(crate) fn skip_waiting(&self) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        let registration = Registration { inner };
        tokio::spawn(async move {
            match registration.skip_waiting().await {
                Ok(true) => tracing::info!("Waiting worker activated"),
                Ok(false) => tracing::debug!("Nothing waiting to activate"),
                Err(e) => tracing::warn!(error = ?e, "Activating waiting worker failed"),
            }
        });
    }
}
