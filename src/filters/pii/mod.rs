//! PII detection — span recognizers, the compiled analyzer, and the
//! filter that stages findings for redaction.

pub mod analyzer;
pub mod filter;
pub mod recognizers;
