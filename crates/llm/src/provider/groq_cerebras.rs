//! Groq and Cerebras (spec.md §4.6): plain OpenAI-compatible upstreams,
//! distinguished only by `api_base_url`. The only behaviour worth a
//! transformer for is a friendlier 404 message, since both upstreams return
//! a bare "model not found" that's unhelpful without the gateway's own model
//! name in it.

use crate::error::LlmError;

/// Rewrites a provider's raw model-not-found body into one naming the model
/// the client actually asked for.
pub fn friendly_model_not_found(requested_model: &str, status: u16, upstream_body: &str) -> LlmError {
    if status == 404 {
        return LlmError::UnknownModel(format!("'{requested_model}' is not available on this upstream"));
    }

    LlmError::ProviderError { status, body: upstream_body.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_status_names_the_requested_model() {
        let err = friendly_model_not_found("llama-70b", 404, "model not found");
        assert!(matches!(err, LlmError::UnknownModel(message) if message.contains("llama-70b")));
    }

    #[test]
    fn other_statuses_pass_through_as_provider_error() {
        let err = friendly_model_not_found("llama-70b", 500, "boom");
        assert!(matches!(err, LlmError::ProviderError { status: 500, .. }));
    }
}
