//! The error taxonomy (spec.md §4.9/§7/§8 C9): a single enum whose variants
//! map 1:1 onto the named error kinds, with HTTP status mapping and a
//! dialect-appropriate JSON body for each. Grounded on the sibling gateway
//! crate's `error.rs` (`LlmError` + `IntoResponse` + `AnthropicErrorResponse`).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider returned an error")]
    ProviderError { status: u16, body: String },

    #[error("upstream stream error: {0}")]
    UpstreamStreamError(String),

    #[error("request timed out")]
    Timeout,

    #[error("request canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// The taxonomy kind name used in both error bodies and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownModel(_) => "unknown_model",
            Self::BadRequest(_) => "bad_request",
            Self::Auth(_) => "auth",
            Self::ProviderError { .. } => "provider_error",
            Self::UpstreamStreamError(_) => "upstream_stream_error",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownModel(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::ProviderError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::UpstreamStreamError(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Canceled => StatusCode::OK,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::ProviderError { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct OpenAiErrorBody<'a> {
    error: OpenAiErrorDetail<'a>,
}

#[derive(Serialize)]
struct OpenAiErrorDetail<'a> {
    r#type: &'a str,
    message: String,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Canceled) {
            return self.status().into_response();
        }

        let status = self.status();
        let body = OpenAiErrorBody {
            error: OpenAiErrorDetail {
                r#type: self.kind(),
                message: self.message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Anthropic-dialect error envelope (`{type:"error", error:{type, message}}`),
/// distinct from the OpenAI-shaped body `IntoResponse` above produces.
#[derive(Serialize)]
pub struct AnthropicErrorResponse {
    r#type: &'static str,
    error: AnthropicErrorDetail,
}

#[derive(Serialize)]
struct AnthropicErrorDetail {
    r#type: String,
    message: String,
}

impl From<&LlmError> for AnthropicErrorResponse {
    fn from(err: &LlmError) -> Self {
        Self {
            r#type: "error",
            error: AnthropicErrorDetail {
                r#type: err.kind().to_string(),
                message: err.message(),
            },
        }
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicError>;

/// Wraps [`LlmError`] so it renders via the Anthropic error envelope instead
/// of the OpenAI-shaped one.
pub struct AnthropicError(pub LlmError);

impl From<LlmError> for AnthropicError {
    fn from(err: LlmError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AnthropicError {
    fn into_response(self) -> Response {
        if matches!(self.0, LlmError::Canceled) {
            return self.0.status().into_response();
        }

        let status = self.0.status();
        let body = AnthropicErrorResponse::from(&self.0);

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_is_bad_request() {
        let err = LlmError::UnknownModel("ghost".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "unknown_model");
    }

    #[test]
    fn provider_error_echoes_upstream_status() {
        let err = LlmError::ProviderError {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.message(), "rate limited");
    }

    #[test]
    fn timeout_maps_to_504() {
        assert_eq!(LlmError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
