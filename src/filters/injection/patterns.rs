//! Static rule catalogue for prompt-injection detection.
//!
//! [`builtin_rules`] returns the full set of [`InjectionRule`]s across five
//! [`RuleCategory`] buckets.  [`PatternMatcher`] compiles the catalogue once
//! into a [`RegexSet`] for O(n) multi-pattern scanning; all rules are always
//! evaluated — the match list and the top-severity rule both feed metrics.
//!
//! Every rule is case-insensitive except the obfuscation rules (zero-width
//! characters, leetspeak), where letter case is part of the signal.

use std::borrow::Cow;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::filters::base::FilterError;

// ── RuleCategory ───────────────────────────────────────────────────────

/// High-level classification of an injection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Attempts to escape safety constraints wholesale.
    Jailbreak,
    /// Attempts to reassign the model's identity or role.
    RoleOverride,
    /// Attempts to exfiltrate the system prompt or hidden instructions.
    SystemExtraction,
    /// Abuse of delimiters, tags, or separators to forge context.
    DelimiterInjection,
    /// Encoding tricks used to evade literal matching.
    EncodingEvasion,
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jailbreak => write!(f, "jailbreak"),
            Self::RoleOverride => write!(f, "role_override"),
            Self::SystemExtraction => write!(f, "system_extraction"),
            Self::DelimiterInjection => write!(f, "delimiter_injection"),
            Self::EncodingEvasion => write!(f, "encoding_evasion"),
        }
    }
}

// ── InjectionRule ──────────────────────────────────────────────────────

/// A single detection rule.
///
/// `severity` is the designer's confidence that one match alone implies
/// intent; the filter's pattern score is the maximum severity among all
/// matched rules.
#[derive(Debug, Clone)]
pub struct InjectionRule {
    /// Stable rule name, e.g. `"ignore_instructions"`.
    pub name: Cow<'static, str>,
    /// Which threat category this rule belongs to.
    pub category: RuleCategory,
    /// Raw regex source (compiled into the matcher's [`RegexSet`]).
    pub regex_str: Cow<'static, str>,
    /// Severity in `[0.0, 1.0]`.
    pub severity: f32,
    /// Human-readable description of what the rule detects.
    pub description: Cow<'static, str>,
}

/// Helper to cut boilerplate when defining static rules.
macro_rules! rule {
    ($name:expr, $cat:expr, $re:expr, $sev:expr, $desc:expr) => {
        InjectionRule {
            name: Cow::Borrowed($name),
            category: $cat,
            regex_str: Cow::Borrowed($re),
            severity: $sev,
            description: Cow::Borrowed($desc),
        }
    };
}

/// Returns the full built-in rule catalogue.
#[must_use]
pub fn builtin_rules() -> Vec<InjectionRule> {
    use RuleCategory::{
        DelimiterInjection, EncodingEvasion, Jailbreak, RoleOverride, SystemExtraction,
    };

    vec![
        // ── Jailbreak ──────────────────────────────────────────────
        rule!(
            "ignore_instructions",
            Jailbreak,
            r"(?i)ignore\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules?|guidelines?)",
            0.95,
            "Attempts to override system instructions"
        ),
        rule!(
            "dan_mode",
            Jailbreak,
            r"(?i)\b(DAN|do\s+anything\s+now)\b",
            0.9,
            "DAN (Do Anything Now) jailbreak attempt"
        ),
        rule!(
            "developer_mode",
            Jailbreak,
            r"(?i)(developer|dev|debug|maintenance)\s+mode\s*(enabled?|on|activated?)",
            0.85,
            "Fake developer mode activation"
        ),
        rule!(
            "jailbreak_keywords",
            Jailbreak,
            r"(?i)\b(jailbreak|bypass\s+filters?|unlock|unrestricted\s+mode|no\s+limits?)\b",
            0.85,
            "Common jailbreak terminology"
        ),
        rule!(
            "forget_instructions",
            Jailbreak,
            r"(?i)(forget|disregard|discard)\s+(everything|all|your)\s+(you|instructions?|training)",
            0.9,
            "Attempts to reset assistant behavior"
        ),
        // ── Role override ──────────────────────────────────────────
        // The regex engine has no look-around, so the benign-role
        // exclusions are not expressible here; severity stays below the
        // block line for a lone match.  The final alternative catches
        // upper-cased persona assignments ("You are DAN").
        rule!(
            "you_are_now",
            RoleOverride,
            r"(?i:you\s+are\s+now|from\s+now\s+on\s+you\s+are|act\s+as\s+if\s+you\s+are)\b|[Yy]ou\s+are\s+[A-Z]{2,}\b",
            0.7,
            "Role reassignment or persona assignment"
        ),
        rule!(
            "pretend_to_be",
            RoleOverride,
            r"(?i)(pretend|imagine|roleplay|act)\s+(to\s+be|as|like|you\s+are)\b",
            0.65,
            "Roleplay-based manipulation"
        ),
        rule!(
            "new_persona",
            RoleOverride,
            r"(?i)(your\s+new\s+(name|identity|persona|role)\s+is|adopt\s+the\s+persona)",
            0.8,
            "Persona injection attempt"
        ),
        // ── System prompt extraction ───────────────────────────────
        rule!(
            "repeat_instructions",
            SystemExtraction,
            r"(?i)(repeat|show|display|reveal|print|output)\s+(your\s+)?(system\s+)?(prompt|instructions?|rules?|guidelines?)",
            0.9,
            "System prompt extraction attempt"
        ),
        rule!(
            "what_are_instructions",
            SystemExtraction,
            r"(?i)what\s+(are|is)\s+(your\s+)?(initial|original|system|secret)?\s*(instructions?|prompt|rules?|guidelines?)",
            0.85,
            "System prompt interrogation"
        ),
        rule!(
            "verbatim_output",
            SystemExtraction,
            r"(?i)(print|output|echo|show)\s+(verbatim|exactly|word\s+for\s+word)",
            0.75,
            "Verbatim output request"
        ),
        // ── Delimiter injection ────────────────────────────────────
        rule!(
            "markdown_delimiter",
            DelimiterInjection,
            r#"(?is)(?:^|\n)(?:"""|''').*?(?:ignore|instruction|system|prompt)"#,
            0.8,
            "Quote-block delimiter injection"
        ),
        rule!(
            "xml_injection",
            DelimiterInjection,
            r"(?i)</?(?:system|instruction|prompt|ignore|override)[^>]*>",
            0.75,
            "XML tag injection"
        ),
        rule!(
            "separator_injection",
            DelimiterInjection,
            r"(?i)(?:^|\n)(?:#{3,}|={3,}|-{3,})\s*(system|instruction|new\s+prompt|override)",
            0.7,
            "Separator-based section injection"
        ),
        // ── Encoding evasion ───────────────────────────────────────
        rule!(
            "base64_instruction",
            EncodingEvasion,
            r"(?i)(decode|interpret|execute)\s+(this\s+)?base64",
            0.8,
            "Base64-encoded instruction attempt"
        ),
        rule!(
            "unicode_obfuscation",
            EncodingEvasion,
            "[\u{200B}\u{200C}\u{200D}\u{FEFF}]",
            0.6,
            "Zero-width character obfuscation"
        ),
        rule!(
            "leetspeak",
            EncodingEvasion,
            r"1gn0r3|1nstruct10n|syst3m|pr0mpt|byp4ss",
            0.5,
            "Leetspeak obfuscation"
        ),
    ]
}

// ── PatternAnalysis ────────────────────────────────────────────────────

/// Result of scanning a text against the full catalogue.
#[derive(Debug, Clone, Default)]
pub struct PatternAnalysis {
    /// Highest severity among matched rules (0.0 when nothing matched).
    pub max_severity: f32,
    /// Names of every rule that matched.
    pub matched: Vec<Cow<'static, str>>,
    /// Name of the highest-severity matched rule.
    pub top_rule: Option<Cow<'static, str>>,
}

// ── PatternMatcher ─────────────────────────────────────────────────────

/// Compiled form of the rule catalogue.
///
/// Built once at startup and shared read-only across request tasks.  Uses
/// the two-pass approach: a [`RegexSet`] identifies *which* rules match,
/// then nothing further — spans are not needed, only names and severities.
#[derive(Debug)]
pub struct PatternMatcher {
    regex_set: RegexSet,
    rules: Vec<InjectionRule>,
}

impl PatternMatcher {
    /// Compile a matcher from an explicit rule list.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Internal`] if any rule regex fails to compile.
    pub fn new(rules: Vec<InjectionRule>) -> Result<Self, FilterError> {
        let sources: Vec<&str> = rules.iter().map(|r| r.regex_str.as_ref()).collect();
        let regex_set = RegexSet::new(&sources).map_err(|e| FilterError::Internal {
            filter: "injection_detector".into(),
            reason: format!("rule catalogue failed to compile: {e}"),
        })?;
        Ok(Self { regex_set, rules })
    }

    /// Compile the built-in catalogue.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] if a built-in rule fails to compile (caught
    /// by the catalogue tests, so effectively unreachable in production).
    pub fn with_defaults() -> Result<Self, FilterError> {
        Self::new(builtin_rules())
    }

    /// Scan `text` against every rule.
    ///
    /// All rules are evaluated; there is no short-circuit, because both the
    /// match list and the top-severity rule feed downstream metrics.
    #[must_use]
    pub fn analyze(&self, text: &str) -> PatternAnalysis {
        let mut analysis = PatternAnalysis::default();

        for idx in self.regex_set.matches(text) {
            let rule = &self.rules[idx];
            analysis.matched.push(rule.name.clone());
            if rule.severity > analysis.max_severity {
                analysis.max_severity = rule.severity;
                analysis.top_rule = Some(rule.name.clone());
            }
        }

        analysis
    }

    /// Number of rules in the compiled catalogue.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
