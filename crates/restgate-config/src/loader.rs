//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use restgate_core::Window;

use crate::{ConfigError, GateConfig, LogFormat, RateLimitPhase};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use restgate_config::ConfigLoader;
///
/// # fn main() -> Result<(), restgate_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("restgate.toml")?
///     .with_env_prefix("RESTGATE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: GateConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GateConfig::default(),
            env_prefix: None,
        }
    }

    /// Reset to default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = GateConfig::default();
        self
    }

    /// Start with the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = GateConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = GateConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `toml` or `json` format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use restgate_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     extensions = ["json"]
    ///     [auth]
    ///     keyword = "MYAPI"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.auth.keyword, "MYAPI");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `RESTGATE__AUTH__REQUIRE_SECURE=true` or
    /// `RESTGATE__RATE_LIMIT__CLASS_LIMITS__CUSTOMER__MAX_REQUESTS=50`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if present.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature leaves room for strict loading.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(self)
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<GateConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> GateConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<GateConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(key_without_prefix) = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
        else {
            return Err(ConfigError::env_parse_error(key, "invalid key format"));
        };

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let bool_value = || {
            parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
        };

        match parts.as_slice() {
            ["EXTENSIONS"] => {
                self.config.extensions = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }

            // Auth section
            ["AUTH", "REQUIRE_SECURE"] => self.config.auth.require_secure = bool_value()?,
            ["AUTH", "KEYWORD"] => self.config.auth.keyword = value.to_string(),
            ["AUTH", "FIELDS", "CLASS"] => self.config.auth.fields.class = value.to_string(),
            ["AUTH", "FIELDS", "APIKEY"] => self.config.auth.fields.apikey = value.to_string(),
            ["AUTH", "FIELDS", "USERNAME"] => {
                self.config.auth.fields.username = value.to_string();
            }

            // Log section
            ["LOG", "ENABLED"] => self.config.log.enabled = bool_value()?,
            ["LOG", "DUMP"] => self.config.log.dump = bool_value()?,

            // Rate limit section
            ["RATE_LIMIT", "ENABLED"] => self.config.rate_limit.enabled = bool_value()?,
            ["RATE_LIMIT", "IDENT_FIELD"] => {
                self.config.rate_limit.ident_field = value.to_string();
            }
            ["RATE_LIMIT", "MESSAGE"] => self.config.rate_limit.message = value.to_string(),
            ["RATE_LIMIT", "PHASE"] => {
                self.config.rate_limit.phase = match value.to_lowercase().as_str() {
                    "before_handler" => RateLimitPhase::BeforeHandler,
                    "after_handler" => RateLimitPhase::AfterHandler,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'before_handler' or 'after_handler'",
                        ))
                    }
                };
            }
            ["RATE_LIMIT", "CLASS_LIMITS", class, field] => {
                let Some(policy) = self
                    .config
                    .rate_limit
                    .class_limits
                    .iter_mut()
                    .find(|(name, _)| name.eq_ignore_ascii_case(class))
                    .map(|(_, policy)| policy)
                else {
                    return Err(ConfigError::env_parse_error(key, "unknown rate-limit class"));
                };
                match *field {
                    "MAX_REQUESTS" => {
                        policy.max_requests = value
                            .parse()
                            .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
                    }
                    "WINDOW" => {
                        policy.window = value
                            .parse::<Window>()
                            .map_err(|e| ConfigError::env_parse_error(key, e.to_string()))?;
                    }
                    _ => {}
                }
            }

            // Telemetry logging
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                self.config.telemetry.logging.enabled = bool_value()?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                self.config.telemetry.logging.ansi_enabled = bool_value()?;
            }

            // Telemetry metrics
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                self.config.telemetry.metrics.enabled = bool_value()?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                self.config.telemetry.metrics.addr = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, GateConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.telemetry.logging.level, "debug");
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
        assert!(config.auth.require_secure);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"extensions": ["json"], "log": {"dump": false}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.extensions, vec!["json"]);
        assert!(!config.log.dump);
        assert!(config.log.enabled);
    }

    #[test]
    fn test_loader_unknown_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_unknown_field_rejected() {
        let result = ConfigLoader::new().with_string("[server]\nport = 1", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/restgate.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/restgate.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.auth.keyword, "TRUEREST");
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            extensions = ["json"]

            [auth]
            require_secure = true

            [rate_limit]
            ident_field = "username"

            [rate_limit.class_limits]
            Customer = {{ window = "-10 minutes", max_requests = 3 }}

            [projections]
            view = ["User.name", {{ from = "User.Profile.city", to = "city" }}]
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!(config.auth.require_secure);
        assert_eq!(config.rate_limit.ident_field, "username");
        assert_eq!(
            config.rate_limit.class_limits["Customer"].window.duration(),
            Duration::minutes(10)
        );
        assert_eq!(config.projection_rules("view").len(), 2);
    }

    #[test]
    fn test_loader_rejects_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[auth]\nkeyword = \"\"", "toml")
            .unwrap()
            .load();
        assert!(result.is_err());
    }

    #[test]
    fn test_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[auth]\nkeyword = \"\"", "toml")
            .unwrap()
            .load_unvalidated();
        assert!(config.auth.keyword.is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_apply_env_var_sections() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__EXTENSIONS", "json, xml", "TEST").unwrap();
        loader.apply_env_var("TEST__AUTH__KEYWORD", "GATE", "TEST").unwrap();
        loader.apply_env_var("TEST__AUTH__FIELDS__APIKEY", "key", "TEST").unwrap();
        loader.apply_env_var("TEST__LOG__DUMP", "false", "TEST").unwrap();
        loader.apply_env_var("TEST__RATE_LIMIT__PHASE", "after_handler", "TEST").unwrap();

        assert_eq!(loader.config.extensions, vec!["json", "xml"]);
        assert_eq!(loader.config.auth.keyword, "GATE");
        assert_eq!(loader.config.auth.fields.apikey, "key");
        assert!(!loader.config.log.dump);
        assert_eq!(loader.config.rate_limit.phase, RateLimitPhase::AfterHandler);
    }

    #[test]
    fn test_apply_env_var_class_limits() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__RATE_LIMIT__CLASS_LIMITS__CUSTOMER__MAX_REQUESTS", "7", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__RATE_LIMIT__CLASS_LIMITS__CUSTOMER__WINDOW", "-1 day", "TEST")
            .unwrap();

        let policy = &loader.config.rate_limit.class_limits["Customer"];
        assert_eq!(policy.max_requests, 7);
        assert_eq!(policy.window.duration(), Duration::days(1));

        let unknown =
            loader.apply_env_var("TEST__RATE_LIMIT__CLASS_LIMITS__ROBOT__MAX_REQUESTS", "1", "TEST");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__LOG__ENABLED", "perhaps", "TEST").is_err());
        assert!(loader
            .apply_env_var("TEST__TELEMETRY__LOGGING__FORMAT", "xml", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__RATE_LIMIT__CLASS_LIMITS__CUSTOMER__WINDOW", "later", "TEST")
            .is_err());
    }
}
