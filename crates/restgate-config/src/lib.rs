//! Typed configuration for Restgate.
//!
//! This crate provides a strongly-typed configuration for the request
//! pipeline with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! The configuration is built around the [`GateConfig`] struct:
//!
//! - [`AuthConfig`] - header keyword, credential field aliases, transport policy
//! - [`AuditLogConfig`] - audit records and payload dumps
//! - [`RateLimitConfig`] - identity field, class policies, rejection message
//! - [`TelemetryConfigSection`] - logging and metrics
//!
//! # Example
//!
//! ```no_run
//! use restgate_config::{ConfigLoader, GateConfig};
//!
//! # fn main() -> Result<(), restgate_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("restgate.toml")?
//!     .with_env_prefix("RESTGATE")
//!     .load()?;
//!
//! println!("Active for: {:?}", config.extensions);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! extensions = ["xml", "json"]
//!
//! [auth]
//! require_secure = false
//! keyword = "TRUEREST"
//!
//! [auth.fields]
//! class = "class"
//! apikey = "apikey"
//! username = "username"
//!
//! [log]
//! enabled = true
//! dump = true
//!
//! [rate_limit]
//! enabled = true
//! ident_field = "apikey"
//! phase = "before_handler"
//!
//! [rate_limit.class_limits]
//! Employee = { window = "-1 hour", max_requests = 1000 }
//! Customer = { window = "-1 hour", max_requests = 100 }
//!
//! [projections]
//! view = ["User.name", { from = "User.Profile.city", to = "city" }]
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with variables of the form `PREFIX__SECTION__KEY`:
//!
//! - `RESTGATE__AUTH__REQUIRE_SECURE=true`
//! - `RESTGATE__LOG__DUMP=false`
//! - `RESTGATE__RATE_LIMIT__CLASS_LIMITS__CUSTOMER__MAX_REQUESTS=50`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.auth.keyword, "TRUEREST");
        assert_eq!(config.rate_limit.ident_field, "apikey");
    }

    #[test]
    fn test_config_builder() {
        let config = GateConfig::builder()
            .auth(AuthConfig {
                require_secure: true,
                ..Default::default()
            })
            .build();

        assert!(config.auth.require_secure);
    }
}
