//! The filter pipeline — orchestrates every registered filter over every
//! message of a request.
//!
//! # Execution model
//!
//! 1. Filters are kept sorted by [`ContentFilter::priority`] (ascending,
//!    stable for ties).
//! 2. Messages are processed in input order; within a message, filters run
//!    strictly sequentially — later filters may depend on earlier findings.
//! 3. A [`FilterAction::Block`] short-circuits the entire run: remaining
//!    filters *and* remaining messages are skipped.
//! 4. A [`FilterAction::Redact`] with modified content swaps the working
//!    text for subsequent filters.
//! 5. A filter error is logged and skipped — errors are non-fatal unless a
//!    filter itself translates them into a block.

use std::sync::Arc;
use std::time::Instant;

use crate::api::schemas::ChatMessage;
use crate::config::GatewayConfig;
use crate::filters::base::{
    ClientInfo, ContentFilter, FilterAction, FilterContext, FilterError, Finding,
};
use crate::filters::injection::filter::InjectionFilter;
use crate::filters::pii::analyzer::PiiAnalyzer;
use crate::filters::pii::filter::PiiFilter;
use crate::filters::redaction::engine::RedactionEngine;
use crate::filters::redaction::filter::RedactionFilter;
use crate::telemetry::metrics::FILTER_DURATION_SECONDS;

// ── PipelineResult ─────────────────────────────────────────────────────

/// The outcome of a full pipeline run over one request.
///
/// When `blocked` is set, `processed_messages` holds an undefined suffix —
/// callers must not read it.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    /// Whether any filter blocked the request.
    pub blocked: bool,
    /// The blocking filter's stated reason.
    pub block_reason: Option<String>,
    /// Name of the filter that blocked.
    pub blocking_filter: Option<String>,
    /// Messages with redactions applied, in input order.
    pub processed_messages: Vec<ChatMessage>,
    /// Every finding reported by any filter, in execution order.
    pub all_findings: Vec<Finding>,
}

impl PipelineResult {
    /// Count of findings of the given entity kind.
    #[must_use]
    pub fn pii_count(&self) -> usize {
        self.all_findings
            .iter()
            .filter(|f| f.kind == crate::filters::base::FindingKind::Pii)
            .count()
    }

    /// Highest injection confidence across findings (0.0 when none).
    #[must_use]
    pub fn injection_score(&self) -> f32 {
        self.all_findings
            .iter()
            .filter(|f| f.kind == crate::filters::base::FindingKind::Injection)
            .map(|f| f.confidence)
            .fold(0.0_f32, f32::max)
    }
}

// ── FilterPipeline ─────────────────────────────────────────────────────

/// Ordered collection of filters applied to every inbound message.
///
/// Built once at startup and shared across request tasks; per-request
/// state lives entirely in the [`FilterContext`] created by
/// [`FilterPipeline::process`].
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn ContentFilter>>,
}

impl FilterPipeline {
    /// An empty pipeline.  Register filters before use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard gateway pipeline: PII detection (10), injection
    /// detection (20), redaction (100).
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] if a detector's static tables fail to
    /// compile.
    pub fn with_default_filters(config: &GatewayConfig) -> Result<Self, FilterError> {
        let analyzer = Arc::new(PiiAnalyzer::with_defaults()?);
        let engine = Arc::new(RedactionEngine::new());

        let mut pipeline = Self::new();
        pipeline.register(PiiFilter::new(analyzer, config.pii_threshold));
        pipeline.register(InjectionFilter::new(config)?);
        pipeline.register(RedactionFilter::new(engine, config.redaction_mode));

        tracing::info!(
            filter_count = pipeline.filters.len(),
            filters = ?pipeline.filter_names(),
            "filter pipeline initialized",
        );

        Ok(pipeline)
    }

    /// Register a filter, keeping the set sorted by priority (stable).
    pub fn register(&mut self, filter: impl ContentFilter + 'static) {
        self.filters.push(Arc::new(filter));
        self.filters.sort_by_key(|f| f.priority());
    }

    /// Names of the registered filters in execution order.
    #[must_use]
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every enabled filter over every message.
    pub async fn process(
        &self,
        messages: &[ChatMessage],
        request_id: &str,
        client_info: ClientInfo,
    ) -> PipelineResult {
        let mut ctx = FilterContext::new(request_id, client_info);
        let mut result = PipelineResult::default();
        let mut processed: Vec<ChatMessage> = Vec::with_capacity(messages.len());

        for message in messages {
            // Tool-result shells without content pass through untouched.
            let Some(content) = message.content.as_ref() else {
                processed.push(message.clone());
                continue;
            };

            let mut current = content.clone();

            for filter in &self.filters {
                if !filter.enabled() {
                    continue;
                }

                let started = Instant::now();
                let outcome = filter.analyze(&current, &mut ctx).await;
                metrics::histogram!(
                    FILTER_DURATION_SECONDS,
                    "filter_name" => filter.name(),
                )
                .record(started.elapsed().as_secs_f64());

                let filter_result = match outcome {
                    Ok(r) => r,
                    Err(e) => {
                        // Non-fatal: continue with the remaining filters.
                        tracing::error!(
                            request_id = %request_id,
                            filter = filter.name(),
                            error = %e,
                            "filter error",
                        );
                        continue;
                    }
                };

                result.all_findings.extend(filter_result.findings);

                match filter_result.action {
                    FilterAction::Block => {
                        result.blocked = true;
                        result.block_reason = filter_result.reason;
                        result.blocking_filter = Some(filter.name().to_string());

                        tracing::warn!(
                            request_id = %request_id,
                            filter = filter.name(),
                            reason = result.block_reason.as_deref().unwrap_or(""),
                            "filter blocked request",
                        );
                        // Remaining filters and messages are skipped;
                        // processed_messages is undefined past this point.
                        result.processed_messages = processed;
                        return result;
                    }
                    FilterAction::Redact => {
                        if let Some(modified) = filter_result.modified_content {
                            current = modified;
                        }
                        tracing::debug!(
                            request_id = %request_id,
                            filter = filter.name(),
                            "filter redacted content",
                        );
                    }
                    FilterAction::Pass => {}
                }
            }

            let mut message = message.clone();
            message.content = Some(current);
            processed.push(message);
        }

        result.processed_messages = processed;
        result
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::schemas::Role;
    use crate::filters::base::{FilterResult, FindingKind};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user(content: &str) -> ChatMessage {
        ChatMessage {
            role: Role::User,
            content: Some(content.to_string()),
            name: None,
        }
    }

    struct NamedPass {
        id: &'static str,
        priority: u32,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContentFilter for NamedPass {
        fn name(&self) -> &'static str {
            self.id
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        async fn analyze(
            &self,
            _content: &str,
            ctx: &mut FilterContext,
        ) -> Result<FilterResult, FilterError> {
            let order = self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.metadata
                .insert(format!("order_{}", self.id), serde_json::json!(order));
            Ok(FilterResult::pass())
        }
    }

    struct Blocker;

    #[async_trait]
    impl ContentFilter for Blocker {
        fn name(&self) -> &'static str {
            "blocker"
        }
        fn priority(&self) -> u32 {
            50
        }
        async fn analyze(
            &self,
            _content: &str,
            _ctx: &mut FilterContext,
        ) -> Result<FilterResult, FilterError> {
            Ok(FilterResult::block(Vec::new(), "threat"))
        }
    }

    struct Failing;

    #[async_trait]
    impl ContentFilter for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn priority(&self) -> u32 {
            1
        }
        async fn analyze(
            &self,
            _content: &str,
            _ctx: &mut FilterContext,
        ) -> Result<FilterResult, FilterError> {
            Err(FilterError::Internal {
                filter: "failing".into(),
                reason: "boom".into(),
            })
        }
    }

    struct Rewriter {
        from: &'static str,
        to: &'static str,
        priority: u32,
    }

    #[async_trait]
    impl ContentFilter for Rewriter {
        fn name(&self) -> &'static str {
            "rewriter"
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        async fn analyze(
            &self,
            content: &str,
            _ctx: &mut FilterContext,
        ) -> Result<FilterResult, FilterError> {
            if content.contains(self.from) {
                Ok(FilterResult::redact_with_content(
                    content.replace(self.from, self.to),
                    "rewrote",
                ))
            } else {
                Ok(FilterResult::pass())
            }
        }
    }

    struct Disabled;

    #[async_trait]
    impl ContentFilter for Disabled {
        fn name(&self) -> &'static str {
            "disabled"
        }
        fn enabled(&self) -> bool {
            false
        }
        async fn analyze(
            &self,
            _content: &str,
            _ctx: &mut FilterContext,
        ) -> Result<FilterResult, FilterError> {
            Ok(FilterResult::block(Vec::new(), "should never run"))
        }
    }

    // 1. Registration order is irrelevant; priority is the contract
    #[tokio::test]
    async fn filters_run_in_priority_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = FilterPipeline::new();
        pipeline.register(NamedPass {
            id: "late",
            priority: 200,
            calls: calls.clone(),
        });
        pipeline.register(NamedPass {
            id: "early",
            priority: 10,
            calls: calls.clone(),
        });

        assert_eq!(pipeline.filter_names(), vec!["early", "late"]);

        let result = pipeline
            .process(&[user("hi")], "req-1", ClientInfo::default())
            .await;
        assert!(!result.blocked);
        assert_eq!(result.processed_messages.len(), 1);
    }

    // 2. Block short-circuits remaining filters and messages
    #[tokio::test]
    async fn block_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Blocker);
        pipeline.register(NamedPass {
            id: "never",
            priority: 200,
            calls: calls.clone(),
        });

        let messages = vec![user("first"), user("second")];
        let result = pipeline
            .process(&messages, "req-2", ClientInfo::default())
            .await;

        assert!(result.blocked);
        assert_eq!(result.blocking_filter.as_deref(), Some("blocker"));
        assert_eq!(result.block_reason.as_deref(), Some("threat"));
        // The later filter never ran — for either message.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // 3. Filter errors are non-fatal
    #[tokio::test]
    async fn filter_error_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Failing);
        pipeline.register(NamedPass {
            id: "after",
            priority: 100,
            calls: calls.clone(),
        });

        let result = pipeline
            .process(&[user("hi")], "req-3", ClientInfo::default())
            .await;
        assert!(!result.blocked);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "later filter must still run");
    }

    // 4. Redacted content is what subsequent filters see
    #[tokio::test]
    async fn redaction_chains_between_filters() {
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Rewriter {
            from: "alpha",
            to: "beta",
            priority: 10,
        });
        pipeline.register(Rewriter {
            from: "beta",
            to: "gamma",
            priority: 20,
        });

        let result = pipeline
            .process(&[user("say alpha now")], "req-4", ClientInfo::default())
            .await;
        assert_eq!(
            result.processed_messages[0].content.as_deref(),
            Some("say gamma now"),
        );
    }

    // 5. Messages with absent content pass through untouched
    #[tokio::test]
    async fn absent_content_is_identity() {
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Rewriter {
            from: "x",
            to: "y",
            priority: 10,
        });

        let shell = ChatMessage {
            role: Role::Tool,
            content: None,
            name: Some("lookup".into()),
        };
        let result = pipeline
            .process(std::slice::from_ref(&shell), "req-5", ClientInfo::default())
            .await;
        assert_eq!(result.processed_messages.len(), 1);
        assert!(result.processed_messages[0].content.is_none());
        assert_eq!(result.processed_messages[0].name.as_deref(), Some("lookup"));
    }

    // 6. Disabled filters never run
    #[tokio::test]
    async fn disabled_filter_skipped() {
        let mut pipeline = FilterPipeline::new();
        pipeline.register(Disabled);

        let result = pipeline
            .process(&[user("hi")], "req-6", ClientInfo::default())
            .await;
        assert!(!result.blocked);
    }

    // 7. Message order preserved through the full default pipeline
    #[tokio::test]
    async fn default_pipeline_preserves_order() {
        let pipeline = FilterPipeline::with_default_filters(&GatewayConfig::default()).unwrap();
        assert_eq!(
            pipeline.filter_names(),
            vec!["pii_detector", "injection_detector", "redaction_filter"],
        );

        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: Some("You are a helpful assistant.".into()),
                name: None,
            },
            user("First question"),
            user("Second question"),
        ];
        let result = pipeline
            .process(&messages, "req-7", ClientInfo::default())
            .await;
        assert!(!result.blocked);
        assert_eq!(result.processed_messages.len(), 3);
        assert_eq!(result.processed_messages[0].role, Role::System);
        assert_eq!(
            result.processed_messages[1].content.as_deref(),
            Some("First question"),
        );
    }

    // 8. Findings accumulate across filters
    #[tokio::test]
    async fn findings_accumulate() {
        struct Finder {
            priority: u32,
        }

        #[async_trait]
        impl ContentFilter for Finder {
            fn name(&self) -> &'static str {
                "finder"
            }
            fn priority(&self) -> u32 {
                self.priority
            }
            async fn analyze(
                &self,
                content: &str,
                _ctx: &mut FilterContext,
            ) -> Result<FilterResult, FilterError> {
                Ok(FilterResult::pass_with(
                    vec![Finding {
                        kind: FindingKind::Custom,
                        entity_type: "marker".into(),
                        confidence: 1.0,
                        start: 0,
                        end: content.chars().count(),
                        filter_name: "finder".into(),
                        metadata: HashMap::new(),
                    }],
                    "found",
                ))
            }
        }

        let mut pipeline = FilterPipeline::new();
        pipeline.register(Finder { priority: 10 });
        pipeline.register(Finder { priority: 20 });

        let result = pipeline
            .process(&[user("a"), user("b")], "req-8", ClientInfo::default())
            .await;
        // Two filters over two messages.
        assert_eq!(result.all_findings.len(), 4);
    }
}
