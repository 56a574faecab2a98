//! HTTP error mapping for the gateway surface.
//!
//! Every failure class maps to the OpenAI-style error envelope; security
//! blocks additionally carry the request id as `security_event_id` so the
//! event can be correlated with logs and metrics without exposing any
//! inspected content.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::proxy::handler::ProxyError;

// ── Wire envelopes ─────────────────────────────────────────────────────

/// Error detail following the OpenAI wire format.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    /// Human-readable message.
    pub message: String,
    /// Error class, e.g. `"security_block"` or `"proxy_error"`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Offending parameter, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Machine-readable code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Standard error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// The error detail.
    pub error: ErrorDetail,
    /// Security event reference, present only on security blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_event_id: Option<String>,
}

// ── ApiError ───────────────────────────────────────────────────────────

/// Failures surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body failed parsing or range validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A security filter blocked the request.
    #[error("request blocked: {reason}")]
    SecurityBlock {
        /// The blocking filter's stated reason.
        reason: String,
        /// Request id echoed as the security event reference.
        request_id: String,
    },

    /// The upstream call failed.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl ApiError {
    /// Stable outcome label for metrics and stats.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid",
            Self::SecurityBlock { .. } => "blocked",
            Self::Proxy(_) => "error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, envelope) = match self {
            Self::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope {
                    error: ErrorDetail {
                        message,
                        error_type: "invalid_request_error".to_string(),
                        param: None,
                        code: None,
                    },
                    security_event_id: None,
                },
            ),
            Self::SecurityBlock { reason, request_id } => (
                StatusCode::FORBIDDEN,
                ErrorEnvelope {
                    error: ErrorDetail {
                        message: format!("Request blocked by security policy: {reason}"),
                        error_type: "security_block".to_string(),
                        param: None,
                        code: Some("prompt_injection_detected".to_string()),
                    },
                    security_event_id: Some(request_id),
                },
            ),
            Self::Proxy(e) => {
                tracing::error!(error = %e, "proxy error");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorEnvelope {
                        error: ErrorDetail {
                            message: "Error communicating with LLM provider".to_string(),
                            error_type: "proxy_error".to_string(),
                            param: None,
                            code: None,
                        },
                        security_event_id: None,
                    },
                )
            }
        };

        (status, Json(envelope)).into_response()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::provider::ProviderError;

    #[test]
    fn security_block_envelope_shape() {
        let err = ApiError::SecurityBlock {
            reason: "Prompt injection detected: dan_mode (score: 0.84)".into(),
            request_id: "req-42".into(),
        };
        assert_eq!(err.status_label(), "blocked");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn proxy_error_maps_to_bad_gateway() {
        let err = ApiError::Proxy(ProxyError::Provider(ProviderError::Upstream {
            status: 503,
        }));
        assert_eq!(err.status_label(), "error");
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_request_maps_to_bad_request() {
        let err = ApiError::InvalidRequest("temperature out of range".into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn envelope_serialization() {
        let envelope = ErrorEnvelope {
            error: ErrorDetail {
                message: "blocked".into(),
                error_type: "security_block".into(),
                param: None,
                code: Some("prompt_injection_detected".into()),
            },
            security_event_id: Some("req-1".into()),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["type"], "security_block");
        assert_eq!(json["error"]["code"], "prompt_injection_detected");
        assert_eq!(json["security_event_id"], "req-1");
        assert!(json["error"].get("param").is_none());
    }
}
