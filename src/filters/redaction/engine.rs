//! The redaction engine — rewrites detected spans under a selectable
//! policy.
//!
//! Overlapping candidate spans are resolved deterministically (higher
//! confidence wins, then the longer span, then the earlier start); the
//! surviving spans are rewritten in one left-to-right builder pass so the
//! item list can report offsets into the *rewritten* text.
//!
//! Spans are char offsets end to end.  The engine builds a char→byte
//! index once per text, so multi-byte content is sliced safely without
//! ever exposing byte positions to callers.

use sha2::{Digest, Sha256};

use crate::config::RedactionMode;

/// How many leading characters the mask mode replaces.
const MASK_CHARS: usize = 8;

// ── RedactionError ─────────────────────────────────────────────────────

/// A span that cannot be applied to the text it claims to describe.
///
/// Reaching the engine with one of these means detection and content
/// have diverged; the caller is expected to fail closed.
#[derive(Debug, thiserror::Error)]
pub enum RedactionError {
    /// Span offsets fall outside the text or are inverted.
    #[error("span {start}..{end} is out of bounds for text of {len} chars")]
    SpanOutOfBounds {
        /// Span start offset.
        start: usize,
        /// Span end offset.
        end: usize,
        /// Text length in chars.
        len: usize,
    },
}

// ── Span types ─────────────────────────────────────────────────────────

/// A candidate span handed to the engine.
#[derive(Debug, Clone)]
pub struct RedactionSpan {
    /// Entity type label, e.g. `"EMAIL_ADDRESS"`.
    pub entity_type: String,
    /// Span start (char offset, inclusive).
    pub start: usize,
    /// Span end (char offset, exclusive).
    pub end: usize,
    /// Detector confidence, used for overlap resolution.
    pub confidence: f32,
}

/// One applied rewrite, with char offsets into the **rewritten** text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedItem {
    /// Entity type label.
    pub entity_type: String,
    /// Start of the replacement in the rewritten text (char offset).
    pub start: usize,
    /// End of the replacement in the rewritten text (char offset).
    pub end: usize,
    /// Which operator produced the replacement.
    pub operator: RedactionMode,
}

/// Result of a redaction pass.
#[derive(Debug, Clone)]
pub struct RedactionOutcome {
    /// The rewritten text.
    pub text: String,
    /// Applied rewrites in document order.
    pub items: Vec<RedactedItem>,
}

// ── RedactionEngine ────────────────────────────────────────────────────

/// Applies a [`RedactionMode`] to a set of candidate spans.
///
/// Stateless; built once and shared across request tasks.
#[derive(Debug, Default)]
pub struct RedactionEngine;

impl RedactionEngine {
    /// Create the engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Rewrite `text` according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`RedactionError`] when a span does not fit the text —
    /// offsets inverted or past the char count.
    pub fn redact(
        &self,
        text: &str,
        spans: &[RedactionSpan],
        mode: RedactionMode,
    ) -> Result<RedactionOutcome, RedactionError> {
        // Char→byte index; one extra entry marks the end of text.
        let mut byte_pos: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        byte_pos.push(text.len());
        let char_len = byte_pos.len() - 1;

        for span in spans {
            if span.start > span.end || span.end > char_len {
                return Err(RedactionError::SpanOutOfBounds {
                    start: span.start,
                    end: span.end,
                    len: char_len,
                });
            }
        }

        let resolved = resolve_overlaps(spans);

        // Per-type counters run in document order, starting at 1.
        let mut counters: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        let mut out = String::with_capacity(text.len());
        let mut out_chars = 0;
        let mut items = Vec::with_capacity(resolved.len());
        let mut cursor = 0;

        for span in &resolved {
            let lead = &text[byte_pos[cursor]..byte_pos[span.start]];
            out.push_str(lead);
            out_chars += span.start - cursor;

            let counter = counters.entry(span.entity_type.as_str()).or_insert(0);
            *counter += 1;

            let original = &text[byte_pos[span.start]..byte_pos[span.end]];
            let replacement = match mode {
                RedactionMode::Placeholder => {
                    format!("[{}_{}]", short_type(&span.entity_type), counter)
                }
                RedactionMode::TypeOnly => format!("[{}]", short_type(&span.entity_type)),
                RedactionMode::Mask => mask_span(original),
                RedactionMode::Hash => {
                    format!("{:x}", Sha256::digest(original.as_bytes()))
                }
            };

            let start = out_chars;
            out.push_str(&replacement);
            out_chars += replacement.chars().count();
            items.push(RedactedItem {
                entity_type: span.entity_type.clone(),
                start,
                end: out_chars,
                operator: mode,
            });

            cursor = span.end;
        }

        out.push_str(&text[byte_pos[cursor]..]);

        Ok(RedactionOutcome { text: out, items })
    }
}

/// Strip the `_ADDRESS` suffix and `US_` prefix from an entity type.
fn short_type(entity_type: &str) -> &str {
    let stripped = entity_type.strip_suffix("_ADDRESS").unwrap_or(entity_type);
    stripped.strip_prefix("US_").unwrap_or(stripped)
}

/// Replace the first [`MASK_CHARS`] characters of the span with `*`,
/// keeping the remainder; shorter spans are masked entirely.
fn mask_span(original: &str) -> String {
    let mut masked = String::with_capacity(original.len());
    let mut chars = original.chars();
    for _ in 0..MASK_CHARS {
        if chars.next().is_none() {
            break;
        }
        masked.push('*');
    }
    masked.extend(chars);
    masked
}

/// Keep the dominant span of every overlapping group.
///
/// Candidates are ranked by confidence (descending), then span length
/// (descending), then start offset (ascending); a candidate overlapping an
/// already-kept span is discarded.  The survivors come back in document
/// order.
fn resolve_overlaps(spans: &[RedactionSpan]) -> Vec<RedactionSpan> {
    let mut ranked: Vec<&RedactionSpan> = spans.iter().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
            .then_with(|| a.start.cmp(&b.start))
    });

    let mut kept: Vec<RedactionSpan> = Vec::with_capacity(ranked.len());
    for candidate in ranked {
        let overlaps = kept
            .iter()
            .any(|existing| candidate.start < existing.end && candidate.end > existing.start);
        if !overlaps {
            kept.push(candidate.clone());
        }
    }

    kept.sort_by_key(|s| (s.start, s.end));
    kept
}

// ── Tests ──────────────────────────────────────────────────────────────
