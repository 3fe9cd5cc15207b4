//! Observability for Restgate: structured logging and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,ignore
//! use restgate_telemetry::{init_telemetry, LogConfig, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .logging(LogConfig::production())
//!     .metrics_addr("0.0.0.0:9464")
//!     .build();
//! init_telemetry(&config)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, render_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_everything_disabled() {
        let config = TelemetryConfig {
            logging: LogConfig {
                enabled: false,
                ..Default::default()
            },
            metrics: MetricsConfig::default(),
        };
        assert!(init_telemetry(&config).is_ok());
    }
}
