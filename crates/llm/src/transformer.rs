//! The transformer contract (spec.md §4.3, C3): a pipeline stage that can
//! rewrite a request before it goes out, rewrite the raw bytes right before
//! they leave, rewrite a provider's raw bytes right after they arrive, or
//! rewrite the unified response after it's been parsed. A model or provider
//! names an ordered chain of these in its `transformer.use` config entry
//! (`config::TransformerChainConfig`); [`Chain`] runs all four hooks in that
//! same configured order (§4.3), the same in/out symmetry the sibling
//! gateway crate's `LlmService` trait gives providers.

use async_trait::async_trait;

use crate::{error::Result, unified};

/// One named stage of a transformer chain.
///
/// All four hooks have a default no-op body so a transformer only needs to
/// implement the hook it actually cares about — most touch exactly one.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite the unified request before routing/dispatch.
    async fn request_in(&self, request: unified::Request) -> Result<unified::Request> {
        Ok(request)
    }

    /// Rewrite the provider-dialect request body right before it's sent.
    async fn request_out(&self, body: serde_json::Value) -> Result<serde_json::Value> {
        Ok(body)
    }

    /// Rewrite a provider-dialect response chunk right after it's received,
    /// before it's parsed back into the unified shape.
    async fn response_in(&self, chunk: unified::Chunk<'static>) -> Result<unified::Chunk<'static>> {
        Ok(chunk)
    }

    /// Rewrite the unified response after parsing, before it's handed to the
    /// dialect bridge for egress.
    async fn response_out(&self, response: unified::Response) -> Result<unified::Response> {
        Ok(response)
    }
}

/// An ordered, named sequence of transformers bound to a model or provider.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Transformer>>,
}

impl Chain {
    pub fn new(stages: Vec<Box<dyn Transformer>>) -> Self {
        Self { stages }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs `request_in` across the chain in configured order.
    pub async fn request_in(&self, mut request: unified::Request) -> Result<unified::Request> {
        for stage in &self.stages {
            request = stage.request_in(request).await?;
        }
        Ok(request)
    }

    /// Runs `request_out` across the chain in configured order.
    pub async fn request_out(&self, mut body: serde_json::Value) -> Result<serde_json::Value> {
        for stage in &self.stages {
            body = stage.request_out(body).await?;
        }
        Ok(body)
    }

    /// Runs `response_in` in configured order, same direction as the
    /// outbound hooks (§4.3: "after the upstream call it runs `responseIn`
    /// left-to-right, then `responseOut` left-to-right").
    pub async fn response_in(&self, mut chunk: unified::Chunk<'static>) -> Result<unified::Chunk<'static>> {
        for stage in &self.stages {
            chunk = stage.response_in(chunk).await?;
        }
        Ok(chunk)
    }

    /// Runs `response_out` in configured order, same direction as `response_in`.
    pub async fn response_out(&self, mut response: unified::Response) -> Result<unified::Response> {
        for stage in &self.stages {
            response = stage.response_out(response).await?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unified::{ContentContainer, FinishReason, Message, Role, Usage};

    struct UppercaseStage;

    #[async_trait]
    impl Transformer for UppercaseStage {
        fn name(&self) -> &'static str {
            "uppercase"
        }

        async fn response_out(&self, mut response: unified::Response) -> Result<unified::Response> {
            if let ContentContainer::Text(text) = &response.message.content {
                response.message.content = ContentContainer::Text(text.to_uppercase());
            }
            Ok(response)
        }
    }

    fn sample_response() -> unified::Response {
        unified::Response {
            id: "1".to_string(),
            model: "test".to_string(),
            message: Message {
                role: Role::Assistant,
                content: ContentContainer::Text("hi".to_string()),
                tool_calls: None,
                tool_call_id: None,
                thinking: None,
                annotations: None,
            },
            finish_reason: FinishReason::EndTurn,
            usage: Usage::default(),
        }
    }

    #[tokio::test]
    async fn chain_runs_response_out_stages() {
        let chain = Chain::new(vec![Box::new(UppercaseStage)]);
        let response = chain.response_out(sample_response()).await.unwrap();
        assert_eq!(response.message.content.as_text(), "HI");
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let chain = Chain::default();
        assert!(chain.is_empty());
        let response = chain.response_out(sample_response()).await.unwrap();
        assert_eq!(response.message.content.as_text(), "hi");
    }
}
