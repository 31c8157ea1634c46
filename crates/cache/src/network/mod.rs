//! Network access for the worker.
//!
//! The worker never talks to a transport directly; it goes through a
//! [`Network`], so tests can script responses and take the network down.

#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "http")]
pub use self::http::HttpNetwork;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockNetwork;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub type NetworkHandle = Arc<dyn Network + Send + Sync>;

/// What kind of resource a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// A page navigation.
    Document,
    Image,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    /// Path relative to the application root, optionally with a query.
    pub path: String,
    pub accept: Option<String>,
    pub destination: Destination,
}

impl FetchRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            accept: None,
            destination: Destination::Other,
        }
    }

    pub fn document(path: impl Into<String>) -> Self {
        Self {
            accept: Some("text/html".to_string()),
            destination: Destination::Document,
            ..Self::get(path)
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn accepts_html(&self) -> bool {
        self.accept.as_deref().is_some_and(|accept| accept.contains("text/html"))
    }
}

/// Where a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Made up locally, e.g. the offline placeholder for images.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl FetchResponse {
    /// A cached resource; the content type is guessed from its key.
    pub fn cached(key: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(mime_guess::from_path(key).first_or_octet_stream().to_string()),
            body,
            source: ResponseSource::Cache,
        }
    }

    /// The placeholder served for page images that are neither cached nor
    /// reachable.
    pub fn unavailable_offline() -> Self {
        Self {
            status: 503,
            content_type: Some("text/plain".to_string()),
            body: b"Image not available offline".to_vec(),
            source: ResponseSource::Synthetic,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A transport able to perform fetches.
///
/// Only unreachable networks are errors; any HTTP status is a response.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// A network that is never reachable, so every request is answered from the
/// cache or its offline fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct Disconnected;

#[async_trait]
impl Network for Disconnected {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        tracing::debug!(path = %request.path, "Network disabled");
        exn::bail!(ErrorKind::Network)
    }
}

/// Strip the leading slash, query and fragment from a request path, giving
/// the key a resource is cached under. The application root maps to the
/// landing page.
pub fn cache_key(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    match path[..end].trim_start_matches('/') {
        "" => crate::consts::LANDING_PAGE,
        key => key,
    }
}
