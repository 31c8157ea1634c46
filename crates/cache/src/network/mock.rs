//! Scripted network for testing.

use super::{FetchRequest, FetchResponse, Network, ResponseSource, cache_key};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// In-memory network serving a fixed set of resources.
///
/// Resources are keyed like the cache (no leading slash, no query), unknown
/// paths answer 404, and the whole network can be switched off to simulate
/// losing connectivity. Every request is recorded in order.
///
/// # Examples
///
/// ```
/// use folio_cache::network::{FetchRequest, MockNetwork, Network};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let network = MockNetwork::default().with_resource("version.json", r#"{"version": "2.0.0"}"#);
/// let response = network.fetch(&FetchRequest::get("version.json?t=1")).await.unwrap();
/// assert_eq!(response.status, 200);
/// network.set_online(false);
/// assert!(network.fetch(&FetchRequest::get("version.json")).await.is_err());
/// # }
/// ```
#[derive(Default)]
pub struct MockNetwork {
    resources: RwLock<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
    latency: Option<Duration>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts a fetch as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockNetwork {
    pub fn with_resource(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        self.resources.get_mut().insert(cache_key(path).to_string(), body.into());
        self
    }

    pub fn with_resources<P: AsRef<str>, B: Into<Vec<u8>>>(mut self, resources: impl IntoIterator<Item = (P, B)>) -> Self {
        let map = self.resources.get_mut();
        for (path, body) in resources {
            map.insert(cache_key(path.as_ref()).to_string(), body.into());
        }
        self
    }

    /// Delay every response, so tests can observe operations in flight.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.resources.write().await.insert(cache_key(path).to_string(), body.into());
    }

    pub async fn remove(&self, path: &str) {
        self.resources.write().await.remove(cache_key(path));
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Paths requested so far, queries included.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }

    /// How many requests hit `path` (compared by cache key).
    pub async fn request_count(&self, path: &str) -> usize {
        let key = cache_key(path);
        self.requests.lock().await.iter().filter(|p| cache_key(p) == key).count()
    }

    /// Most fetches that were ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.requests.lock().await.push(request.path.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network);
        }

        let key = cache_key(&request.path);
        let response = match self.resources.read().await.get(key) {
            Some(body) if request.is_get() => FetchResponse {
                status: 200,
                content_type: Some(mime_guess::from_path(key).first_or_octet_stream().to_string()),
                body: body.clone(),
                source: ResponseSource::Network,
            },
            Some(_) => FetchResponse {
                status: 204,
                content_type: None,
                body: Vec::new(),
                source: ResponseSource::Network,
            },
            None => FetchResponse {
                status: 404,
                content_type: Some("text/plain".to_string()),
                body: b"Not Found".to_vec(),
                source: ResponseSource::Network,
            },
        };
        Ok(response)
    }
}
