//! The proxy handler — selects a provider, forwards sanitized requests,
//! and frames streaming responses.
//!
//! Adapter instances are constructed lazily and cached by provider name.
//! For streaming, an error *before* the first byte propagates to the
//! caller (and becomes a 502); an error *mid-stream* terminates the
//! outbound stream without an error frame — the client observes premature
//! termination, never a forged chunk.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{Stream, StreamExt, stream};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::api::schemas::{ChatCompletionRequest, ChatCompletionResponse};
use crate::config::GatewayConfig;

use super::openai::OpenAiProvider;
use super::provider::{ChunkStream, Provider, ProviderError};
use super::sse::{done_frame, format_frame};

// ── ProxyError ─────────────────────────────────────────────────────────

/// Failures at the proxy layer.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No adapter is wired for the requested provider name.
    #[error("unknown provider: {name}")]
    UnknownProvider {
        /// The requested provider name.
        name: String,
    },

    /// The selected provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

// ── ProxyHandler ───────────────────────────────────────────────────────

/// Forwards sanitized requests to the configured upstream.
///
/// One instance per process, shared across request tasks.
pub struct ProxyHandler {
    config: Arc<GatewayConfig>,
    providers: Mutex<HashMap<String, Arc<dyn Provider>>>,
}

impl ProxyHandler {
    /// Build a handler over the gateway configuration.
    #[must_use]
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            config,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch or lazily construct the default provider's adapter.
    async fn provider(&self) -> Result<Arc<dyn Provider>, ProxyError> {
        let name = self.config.default_provider.as_str();

        let mut providers = self.providers.lock().await;
        if let Some(provider) = providers.get(name) {
            return Ok(provider.clone());
        }

        let provider: Arc<dyn Provider> = match name {
            "openai" => Arc::new(OpenAiProvider::new(self.config.openai_base_url.clone())?),
            other => {
                return Err(ProxyError::UnknownProvider {
                    name: other.to_string(),
                });
            }
        };

        providers.insert(name.to_string(), provider.clone());
        Ok(provider)
    }

    /// Forward a non-streaming completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError`] for an unknown provider or any upstream
    /// failure; no retries.
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
        api_key: Option<&str>,
        request_id: &str,
    ) -> Result<ChatCompletionResponse, ProxyError> {
        let provider = self.provider().await?;

        tracing::debug!(
            request_id = %request_id,
            provider = provider.name(),
            model = %request.model,
            "forwarding request",
        );

        let response = provider.complete(request, api_key).await?;

        tracing::debug!(
            request_id = %request_id,
            provider = provider.name(),
            finish_reason = response
                .choices
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or(""),
            "received response",
        );

        Ok(response)
    }

    /// Forward a streaming completion, yielding SSE-framed strings.
    ///
    /// The `[DONE]` sentinel is appended when the upstream iterator
    /// finishes normally.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError`] when the upstream fails before any chunk is
    /// produced.
    pub async fn stream_completion(
        &self,
        request: &ChatCompletionRequest,
        api_key: Option<&str>,
        request_id: &str,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = String> + Send>>, ProxyError> {
        let provider = self.provider().await?;

        tracing::debug!(
            request_id = %request_id,
            provider = provider.name(),
            model = %request.model,
            "forwarding stream request",
        );

        let chunks = provider.stream(request, api_key).await?;
        Ok(Box::pin(frame_stream(chunks, request_id.to_string())))
    }

    /// Release every cached adapter.
    pub async fn close(&self) {
        let mut providers = self.providers.lock().await;
        for provider in providers.values() {
            provider.close().await;
        }
        providers.clear();
    }
}

// ── Outbound framing ───────────────────────────────────────────────────

enum FrameState {
    Open(ChunkStream, usize),
    Finished,
}

/// Map decoded chunks to SSE frames, appending `[DONE]` on normal end and
/// terminating silently on a mid-stream error.
fn frame_stream(chunks: ChunkStream, request_id: String) -> impl Stream<Item = String> + Send {
    stream::unfold(FrameState::Open(chunks, 0), move |state| {
        let request_id = request_id.clone();
        async move {
            match state {
                FrameState::Open(mut chunks, count) => match chunks.next().await {
                    Some(Ok(value)) => {
                        Some((format_frame(&value), FrameState::Open(chunks, count + 1)))
                    }
                    Some(Err(e)) => {
                        // No error frame is re-injected; the client sees
                        // premature termination.
                        tracing::error!(
                            request_id = %request_id,
                            error = %e,
                            chunk_count = count,
                            "stream error",
                        );
                        None
                    }
                    None => {
                        tracing::debug!(
                            request_id = %request_id,
                            chunk_count = count,
                            "stream completed",
                        );
                        Some((done_frame().to_string(), FrameState::Finished))
                    }
                },
                FrameState::Finished => None,
            }
        }
    })
}

// ── Tests ──────────────────────────────────────────────────────────────
