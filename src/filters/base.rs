//! Core filter contract and the types that flow through the pipeline.
//!
//! Every security filter implements [`ContentFilter`]: it receives the
//! working text of one message plus the per-request [`FilterContext`], and
//! returns a [`FilterResult`] carrying an action, optional rewritten
//! content, and zero or more [`Finding`]s.
//!
//! A [`Finding`] deliberately never stores the matched text — only entity
//! types, offsets, confidences, and free-form metadata are recorded, so
//! findings are safe to log and export.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── FilterAction ───────────────────────────────────────────────────────

/// The decision a filter makes about a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    /// Continue processing unchanged.
    Pass,
    /// Continue processing with (possibly) modified content.
    Redact,
    /// Stop processing and reject the request.
    Block,
}

// ── FindingKind ────────────────────────────────────────────────────────

/// Classification of a security finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Personally identifiable information or secret material.
    Pii,
    /// Prompt-injection attempt.
    Injection,
    /// Anything reported by a user-supplied filter.
    Custom,
}

// ── Finding ────────────────────────────────────────────────────────────

/// A single security finding produced by a filter.
///
/// Offsets are character positions into the content the filter analyzed,
/// half-open, with `start <= end <=` the content's char count.
///
/// Invariant: no field ever contains the matched text itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// What class of detection this is.
    pub kind: FindingKind,
    /// Entity or pattern identifier, e.g. `"EMAIL_ADDRESS"` or `"dan_mode"`.
    pub entity_type: String,
    /// Detector confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Span start (char offset, inclusive).
    pub start: usize,
    /// Span end (char offset, exclusive).
    pub end: usize,
    /// Name of the filter that produced this finding.
    pub filter_name: String,
    /// Free-form detection metadata (scores, pattern names — never content).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ── ClientInfo ─────────────────────────────────────────────────────────

/// Client metadata captured for logging and audit.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// Client IP address, when known.
    pub ip: Option<String>,
    /// `User-Agent` header value.
    pub user_agent: Option<String>,
    /// `Origin` header value.
    pub origin: Option<String>,
}

// ── FilterContext ──────────────────────────────────────────────────────

/// Per-request state shared by the filters of one pipeline run.
///
/// One instance is created per inbound request and dropped when the
/// response is sent.  The typed `pii_findings` slot is the single
/// collaboration channel between filters: the PII detector stages spans
/// there and the redaction filter consumes them.  Other filters must not
/// touch it.
#[derive(Debug, Default)]
pub struct FilterContext {
    /// Unique request identifier.
    pub request_id: String,
    /// Client metadata for audit logging.
    pub client_info: ClientInfo,
    /// Spans staged by the PII detector for the redaction filter,
    /// scoped to the message currently being processed.
    pub pii_findings: Vec<Finding>,
    /// Scratch metadata for custom filters.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FilterContext {
    /// Create a context for one request.
    #[must_use]
    pub fn new(request_id: impl Into<String>, client_info: ClientInfo) -> Self {
        Self {
            request_id: request_id.into(),
            client_info,
            pii_findings: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

// ── FilterResult ───────────────────────────────────────────────────────

/// The outcome of a single filter's analysis.
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// What the pipeline should do next.
    pub action: FilterAction,
    /// Replacement content; honored only when `action` is [`FilterAction::Redact`].
    pub modified_content: Option<String>,
    /// Findings to append to the pipeline result.
    pub findings: Vec<Finding>,
    /// Human-readable explanation (block reason, warning text).
    pub reason: Option<String>,
}

impl FilterResult {
    /// A pass with no findings.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            action: FilterAction::Pass,
            modified_content: None,
            findings: Vec::new(),
            reason: None,
        }
    }

    /// A pass that still carries findings (warn mode).
    #[must_use]
    pub fn pass_with(findings: Vec<Finding>, reason: impl Into<String>) -> Self {
        Self {
            action: FilterAction::Pass,
            modified_content: None,
            findings,
            reason: Some(reason.into()),
        }
    }

    /// A redact without a content rewrite (findings staged for later).
    #[must_use]
    pub fn redact(findings: Vec<Finding>, reason: impl Into<String>) -> Self {
        Self {
            action: FilterAction::Redact,
            modified_content: None,
            findings,
            reason: Some(reason.into()),
        }
    }

    /// A redact that replaces the working content.
    #[must_use]
    pub fn redact_with_content(content: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: FilterAction::Redact,
            modified_content: Some(content.into()),
            findings: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// A block with a reason and optional findings.
    #[must_use]
    pub fn block(findings: Vec<Finding>, reason: impl Into<String>) -> Self {
        Self {
            action: FilterAction::Block,
            modified_content: None,
            findings,
            reason: Some(reason.into()),
        }
    }
}

// ── FilterError ────────────────────────────────────────────────────────

/// An internal failure during filter analysis.
///
/// Distinct from a block: an error means the filter *could not complete*.
/// The pipeline logs the error and continues with the remaining filters;
/// only the redaction filter translates its own failure into a block.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The content could not be processed by this filter.
    #[error("invalid content for filter '{filter}': {reason}")]
    InvalidContent {
        /// Filter identifier.
        filter: String,
        /// What went wrong.
        reason: String,
    },

    /// Unexpected internal failure.
    #[error("internal error in filter '{filter}': {reason}")]
    Internal {
        /// Filter identifier.
        filter: String,
        /// What went wrong.
        reason: String,
    },
}

// ── ContentFilter trait ────────────────────────────────────────────────

/// A single security filter in the pipeline.
///
/// Implementations are constructed once at startup and shared across
/// request tasks; `analyze` must not retain state between calls.  Filters
/// are CPU-bound — the async interface exists to keep the pipeline shape
/// uniform, not because analysis suspends.
#[async_trait]
pub trait ContentFilter: Send + Sync {
    /// Stable identifier used in logs, metrics labels, and block results.
    fn name(&self) -> &'static str;

    /// Execution order — lower values run earlier.  Default is `100`.
    fn priority(&self) -> u32 {
        100
    }

    /// Whether the pipeline should invoke this filter at all.
    fn enabled(&self) -> bool {
        true
    }

    /// Analyze one message's content.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when analysis cannot complete; the pipeline
    /// treats this as non-fatal and continues with the next filter.
    async fn analyze(
        &self,
        content: &str,
        ctx: &mut FilterContext,
    ) -> Result<FilterResult, FilterError>;
}

// ── Tests ──────────────────────────────────────────────────────────────
