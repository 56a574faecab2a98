//! Span recognizers for sensitive entities.
//!
//! Each [`Recognizer`] covers one entity type with one or more scored
//! regex patterns, optional checksum validation, and optional context
//! terms.  Context terms raise the score of *weak* patterns (those marked
//! `boost_with_context`) when a term appears shortly before the span —
//! a standalone 40-character base64 run is noise, the same run next to
//! the word "aws" is a credential.
//!
//! Person names are covered by an introduction-phrase heuristic in place
//! of a full linguistic analyzer.

use std::borrow::Cow;

// ── PiiPattern ─────────────────────────────────────────────────────────

/// One scored pattern inside a recognizer.
#[derive(Debug, Clone)]
pub struct PiiPattern {
    /// Pattern name for recognition metadata.
    pub name: Cow<'static, str>,
    /// Regex source (compiled by the analyzer).
    pub regex_str: Cow<'static, str>,
    /// Base confidence when this pattern matches.
    pub score: f32,
    /// Capture group that delimits the span (0 = whole match).
    pub group: usize,
    /// Whether nearby context terms raise this pattern's score.
    pub boost_with_context: bool,
    /// Checksum or shape validation applied to the span text.
    pub check: Option<fn(&str) -> bool>,
}

impl PiiPattern {
    /// A plain whole-match pattern.
    #[must_use]
    pub const fn new(name: &'static str, regex_str: &'static str, score: f32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            regex_str: Cow::Borrowed(regex_str),
            score,
            group: 0,
            boost_with_context: false,
            check: None,
        }
    }

    /// Use capture group `group` as the span instead of the whole match.
    #[must_use]
    pub const fn group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    /// Mark this pattern as context-sensitive.
    #[must_use]
    pub const fn boosted(mut self) -> Self {
        self.boost_with_context = true;
        self
    }

    /// Attach a validation function run on the span text.
    #[must_use]
    pub const fn checked(mut self, check: fn(&str) -> bool) -> Self {
        self.check = Some(check);
        self
    }
}

// ── Recognizer ─────────────────────────────────────────────────────────

/// A set of patterns detecting one entity type.
#[derive(Debug, Clone)]
pub struct Recognizer {
    /// Entity type label, e.g. `"EMAIL_ADDRESS"`.
    pub entity_type: Cow<'static, str>,
    /// Patterns evaluated for this entity.
    pub patterns: Vec<PiiPattern>,
    /// Context terms that strengthen weak patterns.
    pub context: &'static [&'static str],
}

impl Recognizer {
    fn new(
        entity_type: &'static str,
        patterns: Vec<PiiPattern>,
        context: &'static [&'static str],
    ) -> Self {
        Self {
            entity_type: Cow::Borrowed(entity_type),
            patterns,
            context,
        }
    }
}

// ── Checksum validators ────────────────────────────────────────────────

/// Luhn check over the digits of a candidate card number.
#[must_use]
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let mut sum = 0;
    let mut double = false;
    for &d in digits.iter().rev() {
        let mut d = d;
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
    }
    sum % 10 == 0
}

/// IBAN mod-97 check (ISO 13616).
#[must_use]
pub fn iban_valid(candidate: &str) -> bool {
    let compact: String = candidate.chars().filter(|c| !c.is_whitespace()).collect();
    if !compact.is_ascii() || compact.len() < 15 || compact.len() > 34 {
        return false;
    }
    // Move the country code and check digits to the end, then map letters
    // to 10..35 and fold mod 97.
    let rearranged = format!("{}{}", &compact[4..], &compact[..4]);
    let mut remainder: u32 = 0;
    for c in rearranged.chars() {
        let value = match c {
            '0'..='9' => u32::from(c) - u32::from('0'),
            'A'..='Z' => u32::from(c) - u32::from('A') + 10,
            _ => return false,
        };
        remainder = if value < 10 {
            (remainder * 10 + value) % 97
        } else {
            (remainder * 100 + value) % 97
        };
    }
    remainder == 1
}

/// All four IPv4 octets within range.
#[must_use]
pub fn ipv4_valid(candidate: &str) -> bool {
    let octets: Vec<&str> = candidate.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| o.parse::<u16>().is_ok_and(|v| v <= 255))
}

/// Phone candidates must carry 10–15 digits (rejects years and short ids).
#[must_use]
pub fn phone_digit_count_valid(candidate: &str) -> bool {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits)
}

// ── Built-in recognizer set ────────────────────────────────────────────

/// Returns the full recognizer registry, built once at startup.
#[must_use]
pub fn builtin_recognizers() -> Vec<Recognizer> {
    vec![
        Recognizer::new(
            "EMAIL_ADDRESS",
            vec![PiiPattern::new(
                "email",
                r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
                0.9,
            )],
            &[],
        ),
        Recognizer::new(
            "PHONE_NUMBER",
            vec![
                PiiPattern::new(
                    "phone",
                    r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
                    0.75,
                )
                .checked(phone_digit_count_valid),
            ],
            &[],
        ),
        Recognizer::new(
            "US_SSN",
            vec![PiiPattern::new("ssn_dashed", r"\b\d{3}-\d{2}-\d{4}\b", 0.85)],
            &[],
        ),
        Recognizer::new(
            "CREDIT_CARD",
            vec![
                PiiPattern::new("card", r"\b(?:\d{4}[-\s]?){3}\d{1,4}\b", 0.95)
                    .checked(luhn_valid),
            ],
            &[],
        ),
        Recognizer::new(
            "IP_ADDRESS",
            vec![
                PiiPattern::new("ipv4", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", 0.85)
                    .checked(ipv4_valid),
            ],
            &[],
        ),
        Recognizer::new(
            "IBAN_CODE",
            vec![
                PiiPattern::new("iban", r"\b[A-Z]{2}\d{2}[A-Z0-9]{10,30}\b", 0.9)
                    .checked(iban_valid),
            ],
            &[],
        ),
        Recognizer::new(
            "US_PASSPORT",
            vec![PiiPattern::new("passport_digits", r"\b\d{9}\b", 0.4).boosted()],
            &["passport"],
        ),
        Recognizer::new(
            "US_DRIVER_LICENSE",
            vec![PiiPattern::new("dl_alphanumeric", r"\b[A-Z]\d{7,8}\b", 0.4).boosted()],
            &["driver", "license", "licence", "dl"],
        ),
        Recognizer::new(
            "PERSON",
            vec![
                PiiPattern::new(
                    "name_introduction",
                    r"(?i:my\s+name\s+is|i\s+am|i'm|call\s+me)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
                    0.75,
                )
                .group(1),
            ],
            &[],
        ),
        // ── Secret material ────────────────────────────────────────
        Recognizer::new(
            "API_KEY",
            vec![
                PiiPattern::new("openai_key", r"\bsk-[a-zA-Z0-9]{48}\b", 0.95),
                PiiPattern::new("openai_project_key", r"\bsk-proj-[a-zA-Z0-9_-]{80,}", 0.95),
                PiiPattern::new("github_pat", r"\bghp_[a-zA-Z0-9]{36}\b", 0.95),
                PiiPattern::new("github_oauth", r"\bgho_[a-zA-Z0-9]{36}\b", 0.95),
                PiiPattern::new("aws_access_key", r"\bAKIA[0-9A-Z]{16}\b", 0.9),
                PiiPattern::new("stripe_secret", r"\bsk_(live|test)_[a-zA-Z0-9]{24,}\b", 0.95),
                PiiPattern::new("stripe_publishable", r"\bpk_(live|test)_[a-zA-Z0-9]{24,}\b", 0.85),
                PiiPattern::new("google_api_key", r"\bAIza[0-9A-Za-z_-]{35}", 0.9),
                PiiPattern::new(
                    "slack_token",
                    r"\bxox[baprs]-[0-9]{10,13}-[0-9]{10,13}[a-zA-Z0-9-]*",
                    0.9,
                ),
                PiiPattern::new(
                    "generic_assignment",
                    r#"(?i)(?:api[_-]?key|apikey|secret[_-]?key|access[_-]?token)['"]?\s*[:=]\s*['"]?([a-zA-Z0-9_-]{20,})['"]?"#,
                    0.7,
                )
                .group(1),
            ],
            &["api", "key", "token", "secret", "credential", "auth"],
        ),
        Recognizer::new(
            "AWS_SECRET",
            vec![
                PiiPattern::new(
                    "aws_secret_assignment",
                    r#"(?i)aws[_-]?secret[_-]?(?:access[_-]?)?key['"]?\s*[:=]\s*['"]?([A-Za-z0-9/+=]{40})['"]?"#,
                    0.9,
                )
                .group(1),
                // Bare 40-char base64 runs are only credentials near AWS
                // context words.
                PiiPattern::new("aws_secret_standalone", r"[A-Za-z0-9/+=]{40}", 0.5).boosted(),
            ],
            &["aws", "amazon", "secret", "credentials", "iam"],
        ),
        Recognizer::new(
            "PRIVATE_KEY",
            vec![PiiPattern::new(
                "pem_block",
                r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY-----",
                0.99,
            )],
            &["key", "private", "pem", "ssh", "rsa"],
        ),
    ]
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        for recognizer in &builtin_recognizers() {
            for pattern in &recognizer.patterns {
                regex::Regex::new(&pattern.regex_str).unwrap_or_else(|e| {
                    panic!(
                        "pattern {} of {} has invalid regex: {e}",
                        pattern.name, recognizer.entity_type,
                    )
                });
            }
        }
    }

    #[test]
    fn entity_types_are_unique() {
        let recognizers = builtin_recognizers();
        let types: std::collections::HashSet<_> =
            recognizers.iter().map(|r| &r.entity_type).collect();
        assert_eq!(types.len(), recognizers.len());
    }

    #[test]
    fn scores_in_range() {
        for recognizer in &builtin_recognizers() {
            for pattern in &recognizer.patterns {
                assert!(
                    (0.0..=1.0).contains(&pattern.score),
                    "pattern {} has score {} outside [0.0, 1.0]",
                    pattern.name,
                    pattern.score,
                );
            }
        }
    }

    #[test]
    fn luhn_accepts_known_test_number() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("4111-1111-1111-1111"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("1234"));
    }

    #[test]
    fn iban_accepts_known_example() {
        assert!(iban_valid("GB82WEST12345698765432"));
        assert!(!iban_valid("GB82WEST12345698765431"));
        assert!(!iban_valid("XX00"));
    }

    #[test]
    fn ipv4_octet_ranges() {
        assert!(ipv4_valid("192.168.0.1"));
        assert!(ipv4_valid("255.255.255.255"));
        assert!(!ipv4_valid("999.1.1.1"));
    }

    #[test]
    fn phone_digit_guard() {
        assert!(phone_digit_count_valid("+1-555-123-4567"));
        assert!(!phone_digit_count_valid("2024"));
    }
}
