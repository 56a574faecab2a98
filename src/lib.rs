//! ```text
//! client ──► router ──► FilterPipeline ──► ProxyHandler ──► upstream
//!               │            │                  │
//!               │            ├─► PiiFilter ─────┤ stage spans
//!               │            ├─► InjectionFilter│ score & block
//!               │            └─► RedactionFilter│ rewrite, fail closed
//!               │                               │
//!               └── 403 on block                └── SSE codec on stream
//! ```
//!
//! # sentinel-gateway
//!
//! **Inline security gateway for LLM chat-completion traffic.**
//!
//! The gateway sits on the wire between client applications and remote
//! chat-completion providers.  Every request is intercepted, inspected by
//! an ordered filter pipeline (PII detection, prompt-injection scoring,
//! redaction), and either rejected with a structured security block or
//! forwarded — streaming or not — to the configured upstream.  The HTTP
//! surface is wire-compatible with the widely adopted chat-completion
//! REST API, so existing clients work unmodified.
//!
//! ## Guarantees
//!
//! - **Fail closed** — content that cannot be sanitized is never forwarded.
//! - **No disclosure** — findings, logs, and metrics carry entity types,
//!   offsets, counts, and confidences, never the matched text.
//! - **Strict ordering** — filters run sequentially by priority within a
//!   request; messages are processed in input order.
//!
//! ## Modules
//!
//! - [`config`] – environment-driven configuration with startup validation
//! - [`filters`] – the filter pipeline: PII, injection, redaction
//! - [`proxy`] – provider adapters, SSE codec, streaming proxy handler
//! - [`api`] – wire schemas, error envelopes, and the axum router
//! - [`telemetry`] – tracing setup, metrics, and the stats collaborator

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod filters;
pub mod proxy;
pub mod telemetry;

/// Re-exports for convenient access to core types.
pub mod prelude {
    pub use crate::api::router::{AppState, router};
    pub use crate::api::schemas::{ChatCompletionRequest, ChatMessage, Role};
    pub use crate::config::{GatewayConfig, InjectionAction, RedactionMode};
    pub use crate::filters::base::{
        ClientInfo, ContentFilter, FilterAction, FilterContext, FilterResult, Finding,
        FindingKind,
    };
    pub use crate::filters::pipeline::{FilterPipeline, PipelineResult};
    pub use crate::proxy::handler::ProxyHandler;
    pub use crate::telemetry::stats::StatsStore;
}
