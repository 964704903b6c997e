//! Vertex AI quirks (spec.md §4.6): the only thing every Vertex flavour
//! shares is token acquisition, so that's what lives here as a generic
//! helper over [`crate::http_client::TokenSource`]. The per-dialect content
//! translation is already [`crate::dialect::anthropic`] and
//! [`crate::dialect::openai`] — Vertex's Claude/OpenAI endpoints speak those
//! same wire shapes with the model name folded into the URL path instead of
//! the body, which `reshape_request` below applies uniformly.

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::Result,
    http_client::TokenSource,
    transformer::Transformer,
};

/// Removes `model` from the body — Vertex puts it in the URL path
/// (`.../publishers/.../models/{model}:streamGenerateContent`) instead.
pub fn reshape_request(body: &mut Value) {
    if let Some(object) = body.as_object_mut() {
        object.remove("model");
    }
}

/// Attaches a bearer token obtained from the configured service account
/// (scope `cloud-platform`) as the outbound `Authorization` header.
/// Token refresh/caching is the `TokenSource` implementor's concern (§10.5);
/// this just declares that the Vertex adapter needs one.
pub struct Vertex<T> {
    token_source: T,
}

impl<T: TokenSource> Vertex<T> {
    pub fn new(token_source: T) -> Self {
        Self { token_source }
    }

    pub async fn bearer_header(&self) -> Result<(String, String)> {
        let token = self.token_source.token().await?;
        Ok(("authorization".to_string(), format!("Bearer {token}")))
    }
}

#[async_trait]
impl<T: TokenSource> Transformer for Vertex<T> {
    fn name(&self) -> &'static str {
        "vertex"
    }

    async fn request_out(&self, mut body: Value) -> Result<Value> {
        reshape_request(&mut body);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTokenSource;

    #[async_trait]
    impl TokenSource for FakeTokenSource {
        async fn token(&self) -> Result<String> {
            Ok("fake-token".to_string())
        }
    }

    #[test]
    fn model_is_removed_from_body() {
        let mut body = serde_json::json!({ "model": "claude-opus", "messages": [] });
        reshape_request(&mut body);
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn bearer_header_wraps_token_source_output() {
        let vertex = Vertex::new(FakeTokenSource);
        let (name, value) = vertex.bearer_header().await.unwrap();
        assert_eq!(name, "authorization");
        assert_eq!(value, "Bearer fake-token");
    }
}
