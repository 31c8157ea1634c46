//! Cache-or-network policy for resource fetches.
//!
//! Runs independently of the message protocol and never writes to a cache:
//! page images in particular are only ever cached by an explicit
//! `cache-manual`.

use crate::error::Result;
use crate::network::{Destination, FetchRequest, FetchResponse, cache_key};
use crate::worker::Worker;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// A manual's page document (not the landing page).
    ContentPage,
    PageImage,
    Other,
}

#[derive(Clone)]
pub struct Interceptor {
    worker: Worker,
}

impl Interceptor {
    pub(crate) fn new(worker: Worker) -> Self {
        Self { worker }
    }

    fn route(&self, request: &FetchRequest, key: &str) -> Route {
        let config = self.worker.config();
        if format!("/{key}").contains(&config.image_segment) {
            Route::PageImage
        } else if request.destination == Destination::Document && key != config.landing_page {
            Route::ContentPage
        } else {
            Route::Other
        }
    }

    /// Answer `request` from the caches when possible, else from the network.
    ///
    /// Non-GET requests go straight to the network. When the network is
    /// unreachable, page documents (and anything accepting HTML) fall back to
    /// the cached landing page, and page images get a synthetic 503.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if !request.is_get() {
            return self.worker.network.fetch(request).await;
        }
        let key = cache_key(&request.path);
        if let Some(cached) = self.from_cache(key).await {
            return Ok(cached);
        }

        let network = self.worker.network.fetch(request).await;
        match (self.route(request, key), network) {
            (_, Ok(response)) => Ok(response),
            (Route::PageImage, Err(e)) => {
                tracing::debug!(error = ?e, "Page image not available offline");
                Ok(FetchResponse::unavailable_offline())
            }
            (Route::ContentPage, Err(e)) => self.landing_page().await.ok_or(e),
            (Route::Other, Err(e)) if request.accepts_html() => self.landing_page().await.ok_or(e),
            (Route::Other, Err(e)) => Err(e),
        }
    }

    async fn from_cache(&self, key: &str) -> Option<FetchResponse> {
        let core = self.worker.config().core_cache_name();
        match self.worker.store.lookup(key, &core).await {
            Ok(body) => body.map(|body| FetchResponse::cached(key, body)),
            Err(e) => {
                // A broken cache read degrades to a miss.
                tracing::warn!(key, error = ?e, "Cache lookup failed");
                None
            }
        }
    }

    async fn landing_page(&self) -> Option<FetchResponse> {
        self.from_cache(&self.worker.config().landing_page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MockNetwork, ResponseSource};
    use crate::worker::WorkerConfig;
    use crate::error::ErrorKind;
    use folio_storage::backend::MockBackend;
    use std::sync::Arc;

    async fn setup() -> (Interceptor, Arc<MockNetwork>) {
        let network = Arc::new(
            MockNetwork::default()
                .with_resource("manuals/mb/page.html", "<p>live</p>")
                .with_resource("manuals/mb/images/page_001.jpg", vec![1, 2, 3])
                .with_resource("css/site.css", "body{}"),
        );
        let worker = Worker::new(WorkerConfig::default(), Arc::new(MockBackend::default()), network.clone());
        let core = worker.config().core_cache_name();
        worker.store().put(&core, "index.html", b"<html>landing</html>").await.unwrap();
        worker.store().put("manual-mb", "manuals/mb/images/page_002.jpg", &[9]).await.unwrap();
        (worker.interceptor(), network)
    }

    #[tokio::test]
    async fn cache_first() {
        let (interceptor, network) = setup().await;
        let response = interceptor.fetch(&FetchRequest::get("/manuals/mb/images/page_002.jpg")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, vec![9]);
        assert!(network.requests().await.is_empty());
    }

    #[tokio::test]
    async fn network_responses_are_not_cached() {
        let (interceptor, network) = setup().await;
        let request = FetchRequest::get("manuals/mb/images/page_001.jpg");
        for _ in 0..2 {
            let response = interceptor.fetch(&request).await.unwrap();
            assert_eq!(response.source, ResponseSource::Network);
        }
        assert_eq!(network.request_count("manuals/mb/images/page_001.jpg").await, 2);
    }

    #[tokio::test]
    async fn offline_image_gets_placeholder() {
        let (interceptor, network) = setup().await;
        network.set_online(false);
        let response = interceptor.fetch(&FetchRequest::get("manuals/mb/images/page_001.jpg")).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn offline_page_falls_back_to_landing() {
        let (interceptor, network) = setup().await;
        network.set_online(false);
        let response = interceptor.fetch(&FetchRequest::document("manuals/mb/page.html")).await.unwrap();
        assert_eq!(response.body, b"<html>landing</html>");
        let root = interceptor.fetch(&FetchRequest::document("/")).await.unwrap();
        assert_eq!(root.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn offline_other_resources_propagate_unless_html() {
        let (interceptor, network) = setup().await;
        network.set_online(false);
        let err = interceptor.fetch(&FetchRequest::get("css/site.css")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Network);
        let html = interceptor.fetch(&FetchRequest::get("about").with_accept("text/html")).await.unwrap();
        assert_eq!(html.body, b"<html>landing</html>");
    }

    #[tokio::test]
    async fn non_get_passes_through() {
        let (interceptor, network) = setup().await;
        let response = interceptor.fetch(&FetchRequest::get("index.html").with_method("POST")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(network.request_count("index.html").await, 1);
    }

    #[tokio::test]
    async fn http_errors_are_responses() {
        let (interceptor, _) = setup().await;
        let response = interceptor.fetch(&FetchRequest::document("manuals/mb/missing.html")).await.unwrap();
        assert_eq!(response.status, 404);
    }
}
