//! OpenAI-compatible provider adapter.
//!
//! Posts the serialized request to `{base_url}/chat/completions` with the
//! caller's bearer credential, raises on non-2xx, and for streaming hands
//! the response byte stream to the SSE decoder.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, future, stream};
use serde_json::{Value, json};

use crate::api::schemas::{ChatCompletionRequest, ChatCompletionResponse};

use super::provider::{ChunkStream, Provider, ProviderError};
use super::sse::SseDecoder;

/// Hard ceiling on one upstream call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Ceiling on connection establishment.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── OpenAiProvider ─────────────────────────────────────────────────────

/// Adapter for the OpenAI-compatible chat-completion API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiProvider {
    /// Build an adapter against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Serialize the request with the stream flag forced.
    fn payload(request: &ChatCompletionRequest, stream: bool) -> Result<Value, ProviderError> {
        let mut payload = serde_json::to_value(request).map_err(|e| ProviderError::Decode {
            reason: format!("request serialization failed: {e}"),
        })?;
        payload["stream"] = json!(stream);
        Ok(payload)
    }

    async fn dispatch(
        &self,
        payload: &Value,
        api_key: Option<&str>,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json");

        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
        api_key: Option<&str>,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let payload = Self::payload(request, false)?;
        let response = self.dispatch(&payload, api_key).await?;

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::Decode {
                reason: e.to_string(),
            })
    }

    async fn stream(
        &self,
        request: &ChatCompletionRequest,
        api_key: Option<&str>,
    ) -> Result<ChunkStream, ProviderError> {
        let payload = Self::payload(request, true)?;
        let response = self.dispatch(&payload, api_key).await?;

        let chunks = response
            .bytes_stream()
            .scan(SseDecoder::new(), |decoder, chunk| {
                if decoder.is_done() {
                    return future::ready(None);
                }
                let out: Vec<Result<Value, ProviderError>> = match chunk {
                    Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(ProviderError::Transport(e))],
                };
                future::ready(Some(stream::iter(out)))
            })
            .flatten();

        Ok(Box::pin(chunks))
    }

    async fn close(&self) {
        // reqwest pools connections internally; dropping the client on
        // handler shutdown releases them.
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
