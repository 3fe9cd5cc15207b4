//! Configuration schema types.
//!
//! This module defines the structure of each configuration section.

use indexmap::IndexMap;
use restgate_core::ratelimit::DEFAULT_MESSAGE;
use restgate_core::{CredentialAliases, RateLimitPolicy, RateLimiter, DEFAULT_KEYWORD};
use serde::{Deserialize, Serialize};

/// Credential extraction settings.
///
/// # Example
///
/// ```
/// use restgate_config::AuthConfig;
///
/// let config: AuthConfig = toml::from_str(r#"
///     keyword = "MYAPI"
///     [fields]
///     apikey = "key"
/// "#).unwrap();
/// assert_eq!(config.fields.apikey, "key");
/// assert_eq!(config.fields.class, "class");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Reject requests that did not arrive over a secure channel.
    #[serde(default)]
    pub require_secure: bool,

    /// Shared keyword that prefixes the `Authorization` header.
    #[serde(default = "default_keyword")]
    pub keyword: String,

    /// Field names clients use for each credential role.
    #[serde(default)]
    pub fields: CredentialAliases,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_secure: false,
            keyword: default_keyword(),
            fields: CredentialAliases::default(),
        }
    }
}

fn default_keyword() -> String {
    DEFAULT_KEYWORD.to_string()
}

/// Audit logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuditLogConfig {
    /// Write an audit record for every request.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Store `meta`, input and output snapshots in the record.
    #[serde(default = "default_true")]
    pub dump: bool,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dump: true,
        }
    }
}

/// When the rate limiter runs relative to business logic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPhase {
    /// Admission control before business logic runs.
    #[default]
    BeforeHandler,
    /// After business logic, before the response is built.
    AfterHandler,
}

/// Rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Enforce class policies.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Credential field prior requests are counted by.
    #[serde(default = "default_ident_field")]
    pub ident_field: String,

    /// Where in the pipeline the check runs.
    #[serde(default)]
    pub phase: RateLimitPhase,

    /// Policy per caller class.
    #[serde(default = "default_class_limits")]
    pub class_limits: IndexMap<String, RateLimitPolicy>,

    /// Rejection message; `%s` placeholders take the maximum and the window.
    #[serde(default = "default_message")]
    pub message: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ident_field: default_ident_field(),
            phase: RateLimitPhase::default(),
            class_limits: default_class_limits(),
            message: default_message(),
        }
    }
}

impl RateLimitConfig {
    /// Builds the limiter described by this section.
    #[must_use]
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.ident_field.clone(), self.class_limits.clone())
            .with_message(self.message.clone())
    }
}

fn default_ident_field() -> String {
    "apikey".to_string()
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_class_limits() -> IndexMap<String, RateLimitPolicy> {
    let mut limits = IndexMap::new();
    for (class, max_requests) in [("Employee", 1000), ("Customer", 100)] {
        if let Ok(policy) = RateLimitPolicy::new("-1 hour", max_requests) {
            limits.insert(class.to_string(), policy);
        }
    }
    limits
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Converts to the telemetry crate's logging configuration.
    #[must_use]
    pub fn to_log_config(&self) -> restgate_telemetry::LogConfig {
        restgate_telemetry::LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: self.format == LogFormat::Json,
            file_line_info: self.include_location,
            include_target: true,
            ansi: self.ansi_enabled,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Install the Prometheus recorder.
    #[serde(default)]
    pub enabled: bool,

    /// Scrape listener address; no listener when unset.
    #[serde(default)]
    pub addr: Option<String>,
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl TelemetryConfigSection {
    /// Converts to the telemetry crate's configuration.
    #[must_use]
    pub fn to_telemetry_config(&self) -> restgate_telemetry::TelemetryConfig {
        restgate_telemetry::TelemetryConfig {
            logging: self.logging.to_log_config(),
            metrics: restgate_telemetry::MetricsConfig {
                enabled: self.metrics.enabled,
                addr: self.metrics.addr.clone(),
                ..Default::default()
            },
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_auth_defaults() {
        let config = AuthConfig::default();
        assert!(!config.require_secure);
        assert_eq!(config.keyword, "TRUEREST");
        assert_eq!(config.fields.username, "username");
    }

    #[test]
    fn test_auth_unknown_field_rejected() {
        let result: Result<AuthConfig, _> = toml::from_str("secret = true");
        assert!(result.is_err());
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ident_field, "apikey");
        assert_eq!(config.phase, RateLimitPhase::BeforeHandler);
        assert_eq!(config.class_limits["Employee"].max_requests, 1000);
        assert_eq!(config.class_limits["Customer"].max_requests, 100);
        assert_eq!(
            config.class_limits["Customer"].window.duration(),
            Duration::hours(1)
        );
    }

    #[test]
    fn test_rate_limit_table_replaces_defaults() {
        let config: RateLimitConfig = toml::from_str(
            r#"
            phase = "after_handler"
            [class_limits]
            Partner = { window = "-30 minutes", max_requests = 5 }
            "#,
        )
        .unwrap();
        assert_eq!(config.phase, RateLimitPhase::AfterHandler);
        assert_eq!(config.class_limits.len(), 1);
        assert_eq!(
            config.class_limits["Partner"].window.duration(),
            Duration::minutes(30)
        );
    }

    #[test]
    fn test_bad_window_rejected_at_parse() {
        let result: Result<RateLimitConfig, _> = toml::from_str(
            r#"
            [class_limits]
            Partner = { window = "soon", max_requests = 5 }
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_log_format_deserialize() {
        let format: LogFormat = serde_json::from_str(r#""pretty""#).unwrap();
        assert_eq!(format, LogFormat::Pretty);
    }

    #[test]
    fn test_logging_conversion() {
        let config = LoggingConfig {
            format: LogFormat::Pretty,
            include_location: true,
            ..Default::default()
        };
        let log = config.to_log_config();
        assert!(!log.json_format);
        assert!(log.file_line_info);
    }

    #[test]
    fn test_limiter_from_section() {
        let limiter = RateLimitConfig::default().limiter();
        assert_eq!(limiter.ident_field(), "apikey");
        assert!(limiter.policy("Customer").is_some());
        assert!(limiter.policy("Robot").is_none());
    }
}
