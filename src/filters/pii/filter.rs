//! The PII detection filter — finds sensitive spans and stages them for
//! the redaction filter.  Detection and rewriting are deliberately split:
//! this filter never modifies content.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::filters::base::{
    ContentFilter, FilterContext, FilterError, FilterResult, Finding, FindingKind,
};
use crate::telemetry::metrics::PII_DETECTIONS_TOTAL;

use super::analyzer::PiiAnalyzer;

// ── PiiFilter ──────────────────────────────────────────────────────────

/// Filter that detects PII and secret material (priority 10).
///
/// Findings are staged into the context's typed `pii_findings` slot — the
/// single collaboration channel consumed by the redaction filter — and
/// also returned on the result for the pipeline's audit trail.
pub struct PiiFilter {
    analyzer: Arc<PiiAnalyzer>,
    threshold: f32,
}

impl PiiFilter {
    /// Build the filter around a shared analyzer.
    #[must_use]
    pub fn new(analyzer: Arc<PiiAnalyzer>, threshold: f32) -> Self {
        Self {
            analyzer,
            threshold,
        }
    }
}

#[async_trait]
impl ContentFilter for PiiFilter {
    fn name(&self) -> &'static str {
        "pii_detector"
    }

    fn priority(&self) -> u32 {
        // Runs first so later filters see what was found.
        10
    }

    async fn analyze(
        &self,
        content: &str,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError> {
        let spans = self.analyzer.analyze(content, self.threshold);

        if spans.is_empty() {
            return Ok(FilterResult::pass());
        }

        let mut findings = Vec::with_capacity(spans.len());
        for span in spans {
            metrics::counter!(
                PII_DETECTIONS_TOTAL,
                "entity_type" => span.entity_type.clone(),
            )
            .increment(1);

            let mut metadata = HashMap::new();
            metadata.insert("pattern".to_string(), json!(span.pattern));

            findings.push(Finding {
                kind: FindingKind::Pii,
                entity_type: span.entity_type,
                confidence: span.score,
                start: span.start,
                end: span.end,
                filter_name: self.name().to_string(),
                metadata,
            });
        }

        tracing::info!(
            request_id = %ctx.request_id,
            finding_count = findings.len(),
            "pii detected",
        );

        // Stage for the redaction filter.
        ctx.pii_findings.extend(findings.iter().cloned());

        let count = findings.len();
        Ok(FilterResult::redact(
            findings,
            format!("Detected {count} PII entities"),
        ))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::base::FilterAction;

    fn filter() -> PiiFilter {
        let analyzer = Arc::new(PiiAnalyzer::with_defaults().unwrap());
        PiiFilter::new(analyzer, 0.7)
    }

    // 1. Detection stages findings and returns redact with no rewrite
    #[tokio::test]
    async fn stages_findings_in_context() {
        let f = filter();
        let mut ctx = FilterContext::default();

        let result = f
            .analyze("Please contact me at admin@company.com regarding the merger.", &mut ctx)
            .await
            .unwrap();

        assert_eq!(result.action, FilterAction::Redact);
        assert!(result.modified_content.is_none(), "pii filter must not rewrite");
        assert_eq!(result.findings.len(), 1);
        assert_eq!(ctx.pii_findings.len(), 1);
        assert_eq!(ctx.pii_findings[0].entity_type, "EMAIL_ADDRESS");
        assert_eq!(result.reason.as_deref(), Some("Detected 1 PII entities"));
    }

    // 2. Clean content passes and stages nothing
    #[tokio::test]
    async fn clean_content_passes() {
        let f = filter();
        let mut ctx = FilterContext::default();

        let result = f
            .analyze("Hello, what is the capital of France?", &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.action, FilterAction::Pass);
        assert!(ctx.pii_findings.is_empty());
    }

    // 3. Threshold honored end to end
    #[tokio::test]
    async fn threshold_suppresses_weak_spans() {
        let analyzer = Arc::new(PiiAnalyzer::with_defaults().unwrap());
        let strict = PiiFilter::new(analyzer, 0.95);
        let mut ctx = FilterContext::default();

        // Email scores 0.9 — below a 0.95 threshold it must vanish.
        let result = strict
            .analyze("mail me at admin@company.com", &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.action, FilterAction::Pass);
        assert!(ctx.pii_findings.is_empty());
    }

    // 4. Findings carry offsets and types, never the matched text
    #[tokio::test]
    async fn findings_disclose_no_text() {
        let f = filter();
        let mut ctx = FilterContext::default();
        let result = f
            .analyze("ssn 123-45-6789 on record", &mut ctx)
            .await
            .unwrap();

        let serialized = serde_json::to_string(&result.findings).unwrap();
        assert!(!serialized.contains("123-45-6789"));
        assert!(serialized.contains("US_SSN"));
    }
}
