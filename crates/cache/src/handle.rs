//! Foreground side of the worker channel.

use crate::error::{ErrorKind, Result};
use crate::protocol::{ManualRecord, Request, Response, VersionCheck};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

/// A request plus the dedicated channel its reply travels on.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub request: Request,
    pub reply: Option<oneshot::Sender<Response>>,
}

/// Cheap, cloneable connection to an active worker.
///
/// Replies are matched to requests by a oneshot channel per request, so
/// concurrent requests can never receive each other's answers. Completion
/// order across concurrent requests is not guaranteed.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Envelope>,
    version: Arc<str>,
    response_timeout: Duration,
}

impl WorkerHandle {
    pub(crate) fn new(tx: mpsc::Sender<Envelope>, version: &str, response_timeout: Duration) -> Self {
        Self {
            tx,
            version: Arc::from(version),
            response_timeout,
        }
    }

    /// Version of the worker behind this handle.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a request and wait for its reply.
    ///
    /// Times out with [`ErrorKind::Timeout`]; the worker keeps working on the
    /// request regardless. Requests that are never answered resolve as soon
    /// as they are queued.
    #[instrument(skip_all, fields(action = request.action()))]
    pub async fn request(&self, request: Request) -> Result<Response> {
        if !request.expects_reply() {
            self.post(request).await?;
            return Ok(Response::ok());
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: Some(reply),
            })
            .await
            .map_err(|_| exn::Exn::from(ErrorKind::WorkerStopped))?;
        match tokio::time::timeout(self.response_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => exn::bail!(ErrorKind::WorkerStopped),
            Err(_) => {
                tracing::warn!(timeout = ?self.response_timeout, "Worker did not answer in time");
                exn::bail!(ErrorKind::Timeout)
            }
        }
    }

    /// Queue a request without waiting for any reply.
    pub async fn post(&self, request: Request) -> Result<()> {
        self.tx
            .send(Envelope { request, reply: None })
            .await
            .map_err(|_| exn::Exn::from(ErrorKind::WorkerStopped))
    }

    /// Returns the number of files stored.
    pub async fn cache_manual(&self, manual_id: &str, files: Vec<String>) -> Result<u64> {
        let response = self
            .request(Request::CacheManual {
                manual_id: manual_id.to_string(),
                files,
            })
            .await?;
        Ok(ensure_success(response)?.file_count.unwrap_or(0))
    }

    /// Returns `false` if the manual was not cached.
    pub async fn remove_manual(&self, manual_id: &str) -> Result<bool> {
        let response = self
            .request(Request::RemoveManual {
                manual_id: manual_id.to_string(),
            })
            .await?;
        if let Some(error) = response.error {
            exn::bail!(ErrorKind::Rejected(error));
        }
        Ok(response.success)
    }

    pub async fn offline_manuals(&self) -> Result<Vec<ManualRecord>> {
        let response = ensure_success(self.request(Request::GetOfflineManuals).await?)?;
        Ok(response.manuals.unwrap_or_default())
    }

    pub async fn check_version(&self) -> Result<VersionCheck> {
        let response = ensure_success(self.request(Request::CheckVersion).await?)?;
        Ok(VersionCheck {
            has_update: response.has_update.unwrap_or(false),
            current_version: response.current_version.unwrap_or_else(|| self.version.to_string()),
            latest_version: response.latest_version.unwrap_or_default(),
            update_info: response.update_info.unwrap_or_default(),
        })
    }

    pub async fn skip_waiting(&self) -> Result<()> {
        self.post(Request::SkipWaiting).await
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    if !response.success {
        let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
        exn::bail!(ErrorKind::Rejected(reason));
    }
    Ok(response)
}
