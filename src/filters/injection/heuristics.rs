//! Heuristic scoring for prompt-injection detection.
//!
//! Four stylistic signals complement the rule catalogue: instruction
//! density, suspicious delimiters, urgency language, and context-switch
//! markers.  Each sub-score is normalized to `[0.0, 1.0]`;
//! [`HeuristicScore::combined`] applies the configured weights.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::filters::base::FilterError;

// ── Signal tables ──────────────────────────────────────────────────────

/// Instructional keywords and phrases, matched as substrings of the
/// lowercased text.  Includes role-assignment language ("you are") so
/// persona-hijack text scores nonzero density.
const INSTRUCTION_KEYWORDS: &[&str] = &[
    "you must",
    "you should",
    "you will",
    "you are",
    "always",
    "never",
    "do not",
    "don't",
    "must not",
    "respond with",
    "reply with",
    "output",
    "generate",
    "create",
    "write",
    "say",
    "ignore",
    "forget",
    "disregard",
    "override",
    "bypass",
    "from now on",
    "going forward",
    "starting now",
];

/// Urgent or manipulative phrasing.
const URGENCY_PHRASES: &[&str] = &[
    "important",
    "urgent",
    "critical",
    "immediately",
    "this is a test",
    "this is just",
    "trust me",
    "as an ai",
    "as a language model",
    "hypothetically",
    "in theory",
    "for research",
];

/// Suspicious delimiter regexes.  Each counts once toward the score.
const DELIMITER_PATTERNS: &[&str] = &[
    r#"""""#,
    r"'''",
    r"```",
    r"###",
    r"---",
    r"===",
    r"\[INST\]",
    r"\[/INST\]",
    r"<<SYS>>",
    r"<</SYS>>",
];

/// Context-reset phrasings.
const CONTEXT_SWITCH_PATTERNS: &[&str] = &[
    r"(?i)new\s+conversation",
    r"(?i)start\s+over",
    r"(?i)reset\s+context",
    r"(?i)previous\s+conversation",
    r"(?i)ignore\s+(?:the\s+)?above",
    r"(?i)actual\s+(?:prompt|instruction)",
    r"(?i)real\s+(?:task|request)",
];

// ── HeuristicWeights ───────────────────────────────────────────────────

/// Weights applied when combining the four sub-scores.
///
/// The defaults are the contractual split; they are exposed as plain
/// fields so deployments can re-fit them against a labeled corpus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HeuristicWeights {
    /// Weight of the instruction-density signal.
    pub instruction_density: f32,
    /// Weight of the delimiter signal.
    pub delimiter: f32,
    /// Weight of the urgency signal.
    pub urgency: f32,
    /// Weight of the context-switch signal.
    pub context_switch: f32,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            instruction_density: 0.35,
            delimiter: 0.25,
            urgency: 0.20,
            context_switch: 0.20,
        }
    }
}

// ── HeuristicScore ─────────────────────────────────────────────────────

/// The four sub-scores produced by [`HeuristicAnalyzer::analyze`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HeuristicScore {
    /// How instruction-like the text reads (concentration, not raw count).
    pub instruction_density: f32,
    /// Presence of suspicious delimiters.
    pub delimiter_score: f32,
    /// Presence of urgency/manipulation language.
    pub urgency_score: f32,
    /// Presence of context-reset phrasing.
    pub context_switch_score: f32,
}

impl HeuristicScore {
    /// Weighted combination of the four sub-scores.
    #[must_use]
    pub fn combined(&self, weights: &HeuristicWeights) -> f32 {
        self.instruction_density * weights.instruction_density
            + self.delimiter_score * weights.delimiter
            + self.urgency_score * weights.urgency
            + self.context_switch_score * weights.context_switch
    }
}

// ── HeuristicAnalyzer ──────────────────────────────────────────────────

/// Compiled heuristic analyzer, built once at startup.
#[derive(Debug)]
pub struct HeuristicAnalyzer {
    delimiters: Vec<Regex>,
    context_switches: Vec<Regex>,
}

impl HeuristicAnalyzer {
    /// Compile the delimiter and context-switch pattern tables.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Internal`] if a table pattern fails to
    /// compile (caught by the table tests).
    pub fn new() -> Result<Self, FilterError> {
        let compile = |sources: &[&str]| -> Result<Vec<Regex>, FilterError> {
            sources
                .iter()
                .map(|s| {
                    Regex::new(s).map_err(|e| FilterError::Internal {
                        filter: "injection_detector".into(),
                        reason: format!("heuristic pattern '{s}' failed to compile: {e}"),
                    })
                })
                .collect()
        };

        Ok(Self {
            delimiters: compile(DELIMITER_PATTERNS)?,
            context_switches: compile(CONTEXT_SWITCH_PATTERNS)?,
        })
    }

    /// Score `text` on all four signals.
    ///
    /// Empty or whitespace-only text yields all-zero scores.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn analyze(&self, text: &str) -> HeuristicScore {
        let lower = text.to_lowercase();
        let word_count = text.split_whitespace().count();

        // Instruction density rewards concentration over raw count: the
        // match count is normalized against word_count / 10.
        let instruction_density = if word_count == 0 {
            0.0
        } else {
            let matches = INSTRUCTION_KEYWORDS
                .iter()
                .filter(|kw| lower.contains(*kw))
                .count();
            let denominator = (word_count as f32 / 10.0).max(1.0);
            (matches as f32 / denominator).min(1.0)
        };

        let delimiter_hits = self.delimiters.iter().filter(|re| re.is_match(text)).count();
        let delimiter_score = (delimiter_hits as f32 * 0.15).min(1.0);

        let urgency_hits = URGENCY_PHRASES
            .iter()
            .filter(|phrase| lower.contains(*phrase))
            .count();
        let urgency_score = (urgency_hits as f32 * 0.15).min(1.0);

        let switch_hits = self
            .context_switches
            .iter()
            .filter(|re| re.is_match(text))
            .count();
        let context_switch_score = (switch_hits as f32 * 0.25).min(1.0);

        HeuristicScore {
            instruction_density,
            delimiter_score,
            urgency_score,
            context_switch_score,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
