//! HTTP transport over `reqwest`.

use super::{FetchRequest, FetchResponse, Network, ResponseSource};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use std::time::Duration;
use tracing::instrument;

/// Fetches resources relative to a base URL.
pub struct HttpNetwork {
    client: Client,
    base: Url,
}

impl HttpNetwork {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url).or_raise(|| ErrorKind::InvalidData("base url"))?;
        // Without a trailing slash `join` would replace the last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Network)?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl Network for HttpNetwork {
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = self
            .base
            .join(request.path.trim_start_matches('/'))
            .or_raise(|| ErrorKind::InvalidData("request path"))?;
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .or_raise(|| ErrorKind::InvalidData("request method"))?;

        let mut builder = self.client.request(method, url);
        if let Some(accept) = &request.accept {
            builder = builder.header(ACCEPT, accept);
        }
        let response = builder.send().await.or_raise(|| ErrorKind::Network)?;
        let status = response.status().as_u16();
        let content_type =
            response.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).map(str::to_string);
        let body = response.bytes().await.or_raise(|| ErrorKind::Network)?.to_vec();
        tracing::trace!(status, bytes = body.len(), "Fetched");

        Ok(FetchResponse {
            status,
            content_type,
            body,
            source: ResponseSource::Network,
        })
    }
}
