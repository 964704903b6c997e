//! The dispatch seam (spec.md §10.5): the pipeline engine depends on these
//! two small traits rather than owning transport details, so provider
//! adapters stay unit-testable against a fake and the outbound HTTP client
//! — an external collaborator per §1/§4.4 — stays swappable.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::{LlmError, Result};

pub struct UpstreamRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub type ByteStream = std::pin::Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// The outbound transport a dispatched request goes through. Provider
/// adapters and the pipeline engine (C4) talk to this, never to `reqwest`
/// directly, so a test can substitute a fake.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
    async fn send_stream(&self, request: UpstreamRequest) -> Result<ByteStream>;
}

/// Short-lived bearer token acquisition for providers that need one (Vertex
/// service-account credentials). C6's Vertex adapter declares that it needs
/// a token; it does not itself do OAuth.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamClient for ReqwestClient {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(request.timeout)
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Internal(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|err| LlmError::Internal(err.to_string()))?.to_vec();

        Ok(UpstreamResponse { status, headers, body })
    }

    async fn send_stream(&self, request: UpstreamRequest) -> Result<ByteStream> {
        use futures::StreamExt;

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(request.timeout)
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Internal(err.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|err| LlmError::Internal(err.to_string()))?;
            return Err(LlmError::ProviderError { status, body: String::from_utf8_lossy(&body).to_string() });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| LlmError::UpstreamStreamError(err.to_string())));

        Ok(Box::pin(stream))
    }
}
