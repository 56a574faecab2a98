//! Provider adapter tests against a local mock upstream.

use std::sync::Arc;

use futures_util::StreamExt;
use httpmock::prelude::*;
use serde_json::json;

use sentinel_gateway::api::schemas::{ChatCompletionRequest, ChatMessage, Role};
use sentinel_gateway::config::GatewayConfig;
use sentinel_gateway::proxy::handler::{ProxyError, ProxyHandler};
use sentinel_gateway::proxy::openai::OpenAiProvider;
use sentinel_gateway::proxy::provider::{Provider, ProviderError};

fn request(stream: bool) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: "gpt-4".into(),
        messages: vec![ChatMessage {
            role: Role::User,
            content: Some("Hello, what is the capital of France?".into()),
            name: None,
        }],
        stream,
        ..ChatCompletionRequest::default()
    }
}

fn completion_body() -> serde_json::Value {
    json!({
        "id": "chatcmpl-abc",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Paris."},
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15},
    })
}

// 1. Non-streaming call: bearer forwarded, stream flag forced off,
//    response parsed verbatim.
#[tokio::test]
async fn complete_round_trip() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-client-key")
                .header("content-type", "application/json")
                .body_includes("\"stream\":false");
            then.status(200).json_body(completion_body());
        })
        .await;

    let provider = OpenAiProvider::new(server.base_url()).unwrap();
    let response = provider
        .complete(&request(false), Some("sk-client-key"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.id, "chatcmpl-abc");
    assert_eq!(
        response.choices[0].message.content.as_deref(),
        Some("Paris."),
    );
    assert_eq!(response.usage.as_ref().unwrap().total_tokens, 15);
}

// 2. Missing credential: the call still dispatches (no forged header).
#[tokio::test]
async fn complete_without_credential() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(completion_body());
        })
        .await;

    let provider = OpenAiProvider::new(server.base_url()).unwrap();
    let response = provider.complete(&request(false), None).await.unwrap();
    mock.assert_async().await;
    assert_eq!(response.model, "gpt-4");
}

// 3. Upstream non-2xx surfaces as ProviderError::Upstream with the status.
#[tokio::test]
async fn complete_upstream_error_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401).json_body(json!({"error": "bad key"}));
        })
        .await;

    let provider = OpenAiProvider::new(server.base_url()).unwrap();
    let err = provider
        .complete(&request(false), Some("sk-bad"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Upstream { status: 401 }));
}

// 4. Streaming call decodes SSE frames and stops at [DONE].
#[tokio::test]
async fn stream_decodes_chunks() {
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"is.\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_includes("\"stream\":true");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse_body);
        })
        .await;

    let provider = OpenAiProvider::new(server.base_url()).unwrap();
    let chunks: Vec<_> = provider
        .stream(&request(true), Some("sk-client-key"))
        .await
        .unwrap()
        .collect()
        .await;

    mock.assert_async().await;
    assert_eq!(chunks.len(), 2);
    let first = chunks[0].as_ref().unwrap();
    assert_eq!(first["choices"][0]["delta"]["content"], "Par");
}

// 5. Streaming error before any chunk propagates as Err.
#[tokio::test]
async fn stream_error_before_first_chunk() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503);
        })
        .await;

    let provider = OpenAiProvider::new(server.base_url()).unwrap();
    let err = match provider.stream(&request(true), None).await {
        Ok(_) => panic!("expected stream() to return an error"),
        Err(err) => err,
    };
    assert!(matches!(err, ProviderError::Upstream { status: 503 }));
}

// 6. Handler end to end: frames plus the [DONE] sentinel.
#[tokio::test]
async fn handler_frames_stream_with_done() {
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse_body);
        })
        .await;

    let config = Arc::new(GatewayConfig {
        openai_base_url: server.base_url(),
        ..GatewayConfig::default()
    });
    let handler = ProxyHandler::new(config);

    let frames: Vec<String> = handler
        .stream_completion(&request(true), None, "req-stream")
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    assert!(frames[0].starts_with("data: {"));
    assert_eq!(frames[1], "data: [DONE]\n\n");

    handler.close().await;
}

// 7. Handler surfaces pre-stream failures for the 502 mapping.
#[tokio::test]
async fn handler_propagates_upstream_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500);
        })
        .await;

    let config = Arc::new(GatewayConfig {
        openai_base_url: server.base_url(),
        ..GatewayConfig::default()
    });
    let handler = ProxyHandler::new(config);

    let err = handler
        .complete(&request(false), None, "req-err")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Provider(ProviderError::Upstream { status: 500 }),
    ));
}
