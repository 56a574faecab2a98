//! The upstream provider contract.
//!
//! Adapters are selected by name from configuration and cached by the
//! proxy handler; an OpenAI-compatible adapter is mandatory.  Both calls
//! forward whatever bearer credential the caller supplies — the gateway
//! performs no credential management of its own.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::api::schemas::{ChatCompletionRequest, ChatCompletionResponse};

/// Decoded upstream chunks, ending when the upstream stream ends.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Value, ProviderError>> + Send>>;

// ── ProviderError ──────────────────────────────────────────────────────

/// Failures while talking to an upstream provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection, TLS, or timeout failure before or during transfer.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {status}")]
    Upstream {
        /// HTTP status code from the upstream response.
        status: u16,
    },

    /// The upstream body did not match the expected response shape.
    #[error("upstream response could not be decoded: {reason}")]
    Decode {
        /// What failed to parse.
        reason: String,
    },
}

// ── Provider trait ─────────────────────────────────────────────────────

/// A chat-completion upstream.
///
/// Implementations are cheap to share behind `Arc` and safe to call from
/// concurrent request tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name used for adapter lookup and logging.
    fn name(&self) -> &'static str;

    /// Send a non-streaming completion request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport failure, non-2xx status, or
    /// an undecodable body.  No retries happen at this layer.
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
        api_key: Option<&str>,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// Send a streaming completion request.
    ///
    /// The returned stream yields decoded chunks; it ends when the
    /// upstream closes or the `[DONE]` sentinel arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the request cannot be dispatched or
    /// the upstream answers with a non-2xx status before streaming.
    async fn stream(
        &self,
        request: &ChatCompletionRequest,
        api_key: Option<&str>,
    ) -> Result<ChunkStream, ProviderError>;

    /// Release any held connections.
    async fn close(&self);
}
