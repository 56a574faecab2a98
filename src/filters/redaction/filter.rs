//! The redaction filter — consumes spans staged by the PII detector and
//! rewrites the content.  Fail-closed: if the engine cannot apply the
//! staged spans, the request is blocked rather than forwarded unredacted.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RedactionMode;
use crate::filters::base::{
    ContentFilter, FilterContext, FilterError, FilterResult, FindingKind,
};

use super::engine::{RedactionEngine, RedactionSpan};

// ── RedactionFilter ────────────────────────────────────────────────────

/// Filter that rewrites staged PII spans (priority 100 — runs last).
///
/// Draining the staged slot keeps the collaboration channel scoped to the
/// message currently being processed: spans staged for one message never
/// leak into the next message's rewrite.
pub struct RedactionFilter {
    engine: Arc<RedactionEngine>,
    mode: RedactionMode,
}

impl RedactionFilter {
    /// Build the filter around a shared engine.
    #[must_use]
    pub fn new(engine: Arc<RedactionEngine>, mode: RedactionMode) -> Self {
        Self { engine, mode }
    }
}

#[async_trait]
impl ContentFilter for RedactionFilter {
    fn name(&self) -> &'static str {
        "redaction_filter"
    }

    async fn analyze(
        &self,
        content: &str,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        if ctx.pii_findings.is_empty() {
            return Ok(FilterResult::pass());
        }

        let staged = std::mem::take(&mut ctx.pii_findings);
        let spans: Vec<RedactionSpan> = staged
            .iter()
            .filter(|f| f.kind == FindingKind::Pii)
            .map(|f| RedactionSpan {
                entity_type: f.entity_type.clone(),
                start: f.start,
                end: f.end,
                confidence: f.confidence,
            })
            .collect();

        if spans.is_empty() {
            return Ok(FilterResult::pass());
        }

        match self.engine.redact(content, &spans, self.mode) {
            Ok(outcome) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    original_length = content.len(),
                    redacted_length = outcome.text.len(),
                    items_redacted = outcome.items.len(),
                    "content redacted",
                );
                let count = outcome.items.len();
                Ok(FilterResult::redact_with_content(
                    outcome.text,
                    format!("Redacted {count} items"),
                ))
            }
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    error = %e,
                    "redaction failed",
                );
                // Fail closed: never forward content we could not sanitize.
                Ok(FilterResult::block(
                    Vec::new(),
                    "Redaction failed due to internal error",
                ))
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
