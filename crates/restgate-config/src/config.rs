//! Main configuration types.
//!
//! This module provides the top-level [`GateConfig`] struct and its builder.

use indexmap::IndexMap;
use restgate_core::{AuditRecord, ProjectionRule};
use serde::{Deserialize, Serialize};

use crate::{AuditLogConfig, AuthConfig, ConfigError, RateLimitConfig, TelemetryConfigSection};

/// Complete Restgate configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use restgate_config::GateConfig;
///
/// let config = GateConfig::default();
/// assert!(config.is_enabled_for(Some("json")));
/// assert!(!config.is_enabled_for(Some("html")));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    /// Output format extensions the pipeline is active for.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Credential extraction.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Audit logging.
    #[serde(default)]
    pub log: AuditLogConfig,

    /// Rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Projection rules per action name.
    #[serde(default)]
    pub projections: IndexMap<String, Vec<ProjectionRule>>,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            auth: AuthConfig::default(),
            log: AuditLogConfig::default(),
            rate_limit: RateLimitConfig::default(),
            projections: IndexMap::new(),
            telemetry: TelemetryConfigSection::default(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["xml".to_string(), "json".to_string()]
}

impl GateConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::new()
    }

    /// Returns true if the pipeline is active for a request with this
    /// output extension. Requests without an extension are never active.
    #[must_use]
    pub fn is_enabled_for(&self, extension: Option<&str>) -> bool {
        extension.is_some_and(|ext| {
            self.extensions
                .iter()
                .any(|enabled| enabled.eq_ignore_ascii_case(ext))
        })
    }

    /// Projection rules configured for an action.
    #[must_use]
    pub fn projection_rules(&self, action: &str) -> &[ProjectionRule] {
        self.projections.get(action).map_or(&[], Vec::as_slice)
    }

    /// Validate the configuration.
    ///
    /// Rate limiting without audit logging, or without an identity field,
    /// is not rejected here: each affected request aborts with a
    /// configuration error instead. A warning is logged.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The extension list is empty
    /// - The keyword is empty or contains whitespace
    /// - A credential field alias is empty
    /// - A class policy admits zero requests
    /// - The rate limit identity field names no audit record column
    /// - The log filter or metrics address is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::invalid_value(
                "extensions",
                "at least one extension must be enabled",
            ));
        }

        let keyword = &self.auth.keyword;
        if keyword.is_empty() || keyword.contains(char::is_whitespace) {
            return Err(ConfigError::invalid_value(
                "auth.keyword",
                format!("must be a single non-empty token, got '{keyword}'"),
            ));
        }

        for (role, field) in self.auth.fields.iter() {
            if field.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("auth.fields.{role}"),
                    "field name must not be empty",
                ));
            }
        }

        for (class, policy) in &self.rate_limit.class_limits {
            if policy.max_requests == 0 {
                return Err(ConfigError::invalid_value(
                    format!("rate_limit.class_limits.{class}.max_requests"),
                    "must be greater than zero",
                ));
            }
        }

        let ident_field = &self.rate_limit.ident_field;
        if !ident_field.is_empty()
            && !AuditRecord::QUERYABLE_FIELDS.contains(&self.rate_limit.limiter().record_field())
        {
            let hint = self
                .auth
                .fields
                .iter()
                .find(|(_, field)| *field == ident_field.as_str())
                .map(|(role, _)| format!("; use the role name '{role}' instead of its header alias"))
                .unwrap_or_default();
            return Err(ConfigError::invalid_value(
                "rate_limit.ident_field",
                format!("'{ident_field}' is not a credential role or audit field{hint}"),
            ));
        }

        if self.rate_limit.enabled && !self.log.enabled {
            tracing::warn!("rate limiting is enabled but audit logging is disabled; limited requests will abort");
        }
        if self.rate_limit.enabled && self.rate_limit.ident_field.is_empty() {
            tracing::warn!("rate limiting is enabled without an ident_field; limited requests will abort");
        }

        restgate_telemetry::logging::create_env_filter(&self.telemetry.logging.level)
            .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;

        if let Some(addr) = &self.telemetry.metrics.addr {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, no payload dumps.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = crate::LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config.telemetry.logging.include_location = true;
        config.log.dump = false;
        config
    }

    /// Production preset: JSON logs, secure channel required, metrics on.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = crate::LogFormat::Json;
        config.telemetry.logging.ansi_enabled = false;
        config.telemetry.metrics.enabled = true;
        config.auth.require_secure = true;
        config
    }
}

/// Builder for [`GateConfig`].
#[derive(Debug, Default)]
pub struct GateConfigBuilder {
    extensions: Option<Vec<String>>,
    auth: Option<AuthConfig>,
    log: Option<AuditLogConfig>,
    rate_limit: Option<RateLimitConfig>,
    projections: IndexMap<String, Vec<ProjectionRule>>,
    telemetry: Option<TelemetryConfigSection>,
}

impl GateConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enabled extensions.
    #[must_use]
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// Set the credential configuration.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the audit log configuration.
    #[must_use]
    pub fn log(mut self, log: AuditLogConfig) -> Self {
        self.log = Some(log);
        self
    }

    /// Set the rate limiting configuration.
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Add projection rules for an action.
    #[must_use]
    pub fn projection(mut self, action: impl Into<String>, rules: Vec<ProjectionRule>) -> Self {
        self.projections.insert(action.into(), rules);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> GateConfig {
        GateConfig {
            extensions: self.extensions.unwrap_or_else(default_extensions),
            auth: self.auth.unwrap_or_default(),
            log: self.log.unwrap_or_default(),
            rate_limit: self.rate_limit.unwrap_or_default(),
            projections: self.projections,
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<GateConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
