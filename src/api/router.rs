//! The HTTP surface — binds the OpenAI-compatible routes to the filter
//! pipeline and the proxy handler.
//!
//! Request flow: extract request id and client metadata → parse and
//! validate the body → run the filter pipeline → 403 on block, otherwise
//! forward the sanitized request (streaming or not) to the proxy.
//! Per-request timing runs from entry to response start.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use uuid::Uuid;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::schemas::ChatCompletionRequest;
use crate::config::GatewayConfig;
use crate::filters::base::ClientInfo;
use crate::filters::pipeline::FilterPipeline;
use crate::proxy::handler::ProxyHandler;
use crate::telemetry::metrics::{REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};
use crate::telemetry::stats::{RequestRecord, RequestStatus, StatsStore};

/// Endpoint label used on completion metrics.
const COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";

// ── AppState ───────────────────────────────────────────────────────────

/// Shared state handed to every handler.
///
/// Everything here is constructed once at startup and injected — tests
/// swap components freely.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// The filter pipeline.
    pub pipeline: Arc<FilterPipeline>,
    /// The proxy handler.
    pub proxy: Arc<ProxyHandler>,
    /// The in-memory statistics collaborator.
    pub stats: Arc<StatsStore>,
    /// Prometheus exposition handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// Build the gateway router.
#[must_use]
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/v1/health", get(health));

    if state.metrics.is_some() {
        router = router.route("/metrics", get(metrics_exposition));
    }

    router.layer(CorsLayer::permissive()).with_state(state)
}

/// Build the standalone exposition router for the dedicated metrics port.
#[must_use]
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

// ── Request metadata extraction ────────────────────────────────────────

/// `X-Request-ID` from the client, or a fresh UUID.
fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string)
}

/// Bearer credential from the `Authorization` header, forwarded verbatim.
fn api_key_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Client metadata for audit logging.  The forwarded-for header is
/// authoritative behind the usual reverse proxy.
fn client_info_from(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    ClientInfo {
        ip: header_str("x-forwarded-for").map(|v| {
            v.split(',').next().unwrap_or(&v).trim().to_string()
        }),
        user_agent: header_str("user-agent"),
        origin: header_str("origin"),
    }
}

/// Echo the request id on every completion response.
fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

// ── Outcome recording ──────────────────────────────────────────────────

/// Observe duration and count the outcome; entry-to-response-start timing.
fn record_outcome(state: &AppState, started: Instant, record: RequestRecord) {
    metrics::histogram!(
        REQUEST_DURATION_SECONDS,
        "endpoint" => COMPLETIONS_ENDPOINT,
    )
    .record(started.elapsed().as_secs_f64());
    metrics::counter!(
        REQUESTS_TOTAL,
        "status" => record.status.as_str(),
        "endpoint" => COMPLETIONS_ENDPOINT,
    )
    .increment(1);
    state.stats.record_request(record);
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = request_id_from(&headers);

    let response = match handle_chat(&state, &headers, &body, &request_id, started).await {
        Ok(response) => response,
        Err(err) => {
            // Blocked and upstream outcomes were recorded at their
            // decision points; only validation failures remain.
            if matches!(err, ApiError::InvalidRequest(_)) {
                metrics::histogram!(
                    REQUEST_DURATION_SECONDS,
                    "endpoint" => COMPLETIONS_ENDPOINT,
                )
                .record(started.elapsed().as_secs_f64());
                metrics::counter!(
                    REQUESTS_TOTAL,
                    "status" => err.status_label(),
                    "endpoint" => COMPLETIONS_ENDPOINT,
                )
                .increment(1);
            }
            err.into_response()
        }
    };

    with_request_id(response, &request_id)
}

async fn handle_chat(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    request_id: &str,
    started: Instant,
) -> Result<Response, ApiError> {
    let request: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid request schema: {e}")))?;
    request
        .validate()
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let api_key = api_key_from(headers).or_else(|| state.config.openai_api_key.clone());
    let client_info = client_info_from(headers);

    tracing::info!(
        request_id = %request_id,
        model = %request.model,
        message_count = request.messages.len(),
        stream = request.stream,
        client_ip = client_info.ip.as_deref().unwrap_or(""),
        "chat completion request",
    );

    let filter_result = state
        .pipeline
        .process(&request.messages, request_id, client_info)
        .await;

    let pii_count = filter_result.pii_count();
    let injection_score = filter_result.injection_score();

    if filter_result.blocked {
        let reason = filter_result
            .block_reason
            .unwrap_or_else(|| "policy violation".to_string());

        tracing::warn!(
            request_id = %request_id,
            filter_name = filter_result.blocking_filter.as_deref().unwrap_or(""),
            reason = %reason,
            "request blocked",
        );

        record_outcome(
            state,
            started,
            RequestRecord {
                id: request_id.to_string(),
                timestamp: Utc::now(),
                status: RequestStatus::Blocked,
                pii_count,
                injection_score,
                latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                model: request.model.clone(),
            },
        );

        return Err(ApiError::SecurityBlock {
            reason,
            request_id: request_id.to_string(),
        });
    }

    // Upstream sees the sanitized messages, never the originals.
    let mut sanitized = request.clone();
    sanitized.messages = filter_result.processed_messages;

    if sanitized.stream {
        let frames = match state
            .proxy
            .stream_completion(&sanitized, api_key.as_deref(), request_id)
            .await
        {
            Ok(frames) => frames,
            Err(e) => {
                record_outcome(
                    state,
                    started,
                    RequestRecord {
                        id: request_id.to_string(),
                        timestamp: Utc::now(),
                        status: RequestStatus::Error,
                        pii_count,
                        injection_score,
                        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                        model: sanitized.model.clone(),
                    },
                );
                return Err(e.into());
            }
        };

        // Streaming outcomes are recorded at dispatch time.
        record_outcome(
            state,
            started,
            RequestRecord {
                id: request_id.to_string(),
                timestamp: Utc::now(),
                status: RequestStatus::Allowed,
                pii_count,
                injection_score,
                latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                model: sanitized.model.clone(),
            },
        );

        let body = Body::from_stream(
            frames.map(|frame| Ok::<_, std::convert::Infallible>(Bytes::from(frame))),
        );
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response());
    }

    match state
        .proxy
        .complete(&sanitized, api_key.as_deref(), request_id)
        .await
    {
        Ok(response) => {
            record_outcome(
                state,
                started,
                RequestRecord {
                    id: request_id.to_string(),
                    timestamp: Utc::now(),
                    status: RequestStatus::Allowed,
                    pii_count,
                    injection_score,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    model: sanitized.model.clone(),
                },
            );
            Ok(Json(response).into_response())
        }
        Err(e) => {
            record_outcome(
                state,
                started,
                RequestRecord {
                    id: request_id.to_string(),
                    timestamp: Utc::now(),
                    status: RequestStatus::Error,
                    pii_count,
                    injection_score,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    model: sanitized.model.clone(),
                },
            );
            Err(e.into())
        }
    }
}

/// Static model list — pass-through placeholder.
async fn list_models() -> Json<Value> {
    let created = Utc::now().timestamp();
    Json(json!({
        "object": "list",
        "data": [
            {"id": "gpt-4", "object": "model", "created": created, "owned_by": "openai"},
            {"id": "gpt-3.5-turbo", "object": "model", "created": created, "owned_by": "openai"},
        ],
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn metrics_exposition(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
