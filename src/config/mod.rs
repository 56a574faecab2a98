//! Gateway configuration.
//!
//! [`GatewayConfig`] is assembled once at startup from the process
//! environment (after a `dotenvy` pass) and validated before any listener
//! binds.  Invalid values fail fast with a [`ConfigError`] — configuration
//! problems must never surface at request time.
//!
//! All keys carry a `SENTINEL_` prefix; upstream credentials are also
//! honored under their conventional unprefixed names (`OPENAI_API_KEY`,
//! `OPENAI_BASE_URL`, `GEMINI_API_KEY`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Environment variable prefix for all gateway settings.
const ENV_PREFIX: &str = "SENTINEL_";

// ── ConfigError ────────────────────────────────────────────────────────

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed into its target type.
    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Environment variable key.
        key: String,
        /// What went wrong.
        message: String,
    },

    /// A value parsed but failed range/shape validation.
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

// ── Enumerations ───────────────────────────────────────────────────────

/// Logging verbosity floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Everything, including per-filter traces.
    Debug,
    /// Normal operation (default).
    Info,
    /// Degraded operation only.
    Warning,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Directive string accepted by the tracing `EnvFilter`.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Machine-readable JSON lines (default).
    Json,
    /// Human-readable console output with ANSI colors.
    Console,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "console" => Ok(Self::Console),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Strategy for rewriting a detected sensitive span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    /// `[EMAIL_1]`, `[SSN_2]` — numbered per entity type (default).
    Placeholder,
    /// `[EMAIL]`, `[SSN]` — type marker without a counter.
    TypeOnly,
    /// First eight characters of the span replaced with `*`.
    Mask,
    /// Hex SHA-256 of the span contents.
    Hash,
}

impl FromStr for RedactionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "type_only" => Ok(Self::TypeOnly),
            "mask" => Ok(Self::Mask),
            "hash" => Ok(Self::Hash),
            other => Err(format!("unknown redaction mode '{other}'")),
        }
    }
}

/// What to do when the injection score crosses the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionAction {
    /// Reject the request with a security block (default).
    Block,
    /// Let the request through but record the finding.
    Warn,
}

impl InjectionAction {
    /// Stable label used in metrics and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Warn => "warn",
        }
    }
}

impl FromStr for InjectionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "warn" => Ok(Self::Warn),
            other => Err(format!("unknown injection action '{other}'")),
        }
    }
}

/// Upstream provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible chat-completion API (default).
    OpenAi,
    /// Google Gemini. Accepted in configuration; no adapter is wired yet,
    /// so selecting it fails at request time with an unknown-provider error.
    Gemini,
}

impl ProviderKind {
    /// Stable name used for adapter lookup.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

// ── GatewayConfig ──────────────────────────────────────────────────────

/// Complete gateway configuration.
///
/// Construct with [`GatewayConfig::from_env`] in production or
/// [`GatewayConfig::default`] in tests.
#[derive(Debug, Clone, Validate)]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener.
    pub host: String,
    /// Bind port for the HTTP listener.
    pub port: u16,

    /// Default upstream adapter.
    pub default_provider: ProviderKind,
    /// Bearer credential used when the client supplies none.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible upstream.
    pub openai_base_url: String,
    /// Gemini credential slot (adapter not yet wired).
    pub gemini_api_key: Option<String>,

    /// Minimum combined injection score that triggers the configured action.
    #[validate(range(min = 0.0, max = 1.0))]
    pub injection_threshold: f32,
    /// Action taken when the injection threshold is reached.
    pub injection_action: InjectionAction,
    /// Minimum recognizer confidence for a PII span to be kept.
    #[validate(range(min = 0.0, max = 1.0))]
    pub pii_threshold: f32,
    /// How kept PII spans are rewritten.
    pub redaction_mode: RedactionMode,

    /// Logging verbosity floor.
    pub log_level: LogLevel,
    /// Log output format.
    pub log_format: LogFormat,
    /// Whether Prometheus exposition is enabled.
    pub metrics_enabled: bool,
    /// Dedicated port for the metrics listener.
    pub metrics_port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            default_provider: ProviderKind::OpenAi,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            gemini_api_key: None,
            injection_threshold: 0.7,
            injection_action: InjectionAction::Block,
            pii_threshold: 0.7,
            redaction_mode: RedactionMode::Placeholder,
            log_level: LogLevel::Info,
            log_format: LogFormat::Json,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    ///
    /// Runs a `dotenvy` pass first so a local `.env` file is honored, then
    /// overlays `SENTINEL_*` variables on the compiled defaults and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvParse`] for a malformed variable and
    /// [`ConfigError::Validation`] for out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut cfg = Self::default();

        if let Some(host) = env_string("HOST") {
            cfg.host = host;
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            cfg.port = port;
        }
        if let Some(provider) = env_parse::<ProviderKind>("DEFAULT_PROVIDER")? {
            cfg.default_provider = provider;
        }
        if let Some(threshold) = env_parse::<f32>("INJECTION_THRESHOLD")? {
            cfg.injection_threshold = threshold;
        }
        if let Some(action) = env_parse::<InjectionAction>("INJECTION_ACTION")? {
            cfg.injection_action = action;
        }
        if let Some(threshold) = env_parse::<f32>("PII_THRESHOLD")? {
            cfg.pii_threshold = threshold;
        }
        if let Some(mode) = env_parse::<RedactionMode>("REDACTION_MODE")? {
            cfg.redaction_mode = mode;
        }
        if let Some(level) = env_parse::<LogLevel>("LOG_LEVEL")? {
            cfg.log_level = level;
        }
        if let Some(format) = env_parse::<LogFormat>("LOG_FORMAT")? {
            cfg.log_format = format;
        }
        if let Some(enabled) = env_parse::<bool>("METRICS_ENABLED")? {
            cfg.metrics_enabled = enabled;
        }
        if let Some(port) = env_parse::<u16>("METRICS_PORT")? {
            cfg.metrics_port = port;
        }

        // Upstream credentials: prefixed form wins, conventional form is a
        // fallback so standard deployments need no renaming.
        cfg.openai_api_key = env_string("OPENAI_API_KEY")
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|v| !v.trim().is_empty());
        if let Some(url) = env_string("OPENAI_BASE_URL")
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            .filter(|v| !v.trim().is_empty())
        {
            cfg.openai_base_url = url;
        }
        cfg.gemini_api_key = env_string("GEMINI_API_KEY")
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|v| !v.trim().is_empty());

        cfg.validate()?;
        Ok(cfg)
    }
}

/// Read a prefixed environment variable as a raw string.
fn env_string(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}")).ok()
}

/// Read and parse a prefixed environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::EnvParse {
                key: format!("{ENV_PREFIX}{key}"),
                message: e.to_string(),
            }),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = GatewayConfig::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.injection_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.redaction_mode, RedactionMode::Placeholder);
        assert_eq!(cfg.injection_action, InjectionAction::Block);
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let cfg = GatewayConfig {
            injection_threshold: 1.5,
            ..GatewayConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn enums_parse_from_snake_case() {
        assert_eq!(
            "type_only".parse::<RedactionMode>().unwrap(),
            RedactionMode::TypeOnly,
        );
        assert_eq!("warn".parse::<InjectionAction>().unwrap(), InjectionAction::Warn);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!("mystery".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn log_level_filter_directives() {
        assert_eq!(LogLevel::Warning.as_filter(), "warn");
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
    }
}
