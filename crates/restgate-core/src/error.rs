//! Error types for Restgate.
//!
//! [`GateError`] is the taxonomy every pipeline stage reports failures in.
//! Stage failures never escape the pipeline: each one is recorded as feedback
//! at [`GateError::level`] and, when it aborts, finishes the request with
//! [`GateError::status`].
//!
//! | Variant | Status | Feedback level |
//! |---|---|---|
//! | `Validation` | 400 | error |
//! | `Auth` | 401 | warning |
//! | `RateLimitExceeded` | 403 | error |
//! | `Transport` | 403 | error |
//! | `Config` | 500 | error |
//! | `Audit` | 500 | warning |

use crate::audit::AuditError;
use crate::credentials::AuthError;
use crate::feedback::FeedbackLevel;
use crate::status::HttpStatus;
use thiserror::Error;

/// Categories of gate failures, used for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unsupported payload shape.
    Validation,
    /// Unusable credentials.
    Auth,
    /// Admission denied.
    RateLimited,
    /// Misconfigured middleware.
    Config,
    /// Insecure channel.
    Transport,
    /// Audit store failure.
    Audit,
    /// Abort raised explicitly by business logic.
    Explicit,
}

impl ErrorKind {
    /// Returns the snake_case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::Config => "config",
            Self::Transport => "transport",
            Self::Audit => "audit",
            Self::Explicit => "explicit",
        }
    }
}

/// Standard error type for pipeline stages.
///
/// # Example
///
/// ```
/// use restgate_core::{GateError, HttpStatus};
///
/// let err = GateError::validation("You may only send 1 dimensional posts");
/// assert_eq!(err.status(), HttpStatus::BadRequest);
/// assert_eq!(err.message(), "You may only send 1 dimensional posts");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The request payload has an unsupported shape.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// The credentials header could not be used.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The caller exceeded its class policy.
    #[error("Rate limited: {message}")]
    RateLimitExceeded {
        /// Message naming the limit and window.
        message: String,
        /// Caller class the policy belongs to.
        class: String,
        /// Matching records found in the window.
        count: u64,
        /// Policy maximum.
        max_requests: u64,
    },

    /// The middleware configuration cannot serve this request.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// A secure channel is required but the request arrived insecurely.
    #[error("Transport error: {message}")]
    Transport {
        /// Human-readable error message.
        message: String,
    },

    /// The audit store failed.
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

impl GateError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a rate-limit error.
    #[must_use]
    pub fn rate_limited(
        message: impl Into<String>,
        class: impl Into<String>,
        count: u64,
        max_requests: u64,
    ) -> Self {
        Self::RateLimitExceeded {
            message: message.into(),
            class: class.into(),
            count,
            max_requests,
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Auth(_) => ErrorKind::Auth,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimited,
            Self::Config { .. } => ErrorKind::Config,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Audit(_) => ErrorKind::Audit,
        }
    }

    /// Returns the HTTP status the request finishes with when this error aborts it.
    #[must_use]
    pub const fn status(&self) -> HttpStatus {
        match self {
            Self::Validation { .. } => HttpStatus::BadRequest,
            Self::Auth(_) => HttpStatus::Unauthorized,
            Self::RateLimitExceeded { .. } | Self::Transport { .. } => HttpStatus::Forbidden,
            Self::Config { .. } | Self::Audit(_) => HttpStatus::InternalServerError,
        }
    }

    /// Returns the feedback level this error is recorded under.
    #[must_use]
    pub const fn level(&self) -> FeedbackLevel {
        match self {
            Self::Auth(_) | Self::Audit(_) => FeedbackLevel::Warning,
            _ => FeedbackLevel::Error,
        }
    }

    /// Returns the client-facing message, without the category prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Validation { message }
            | Self::RateLimitExceeded { message, .. }
            | Self::Config { message }
            | Self::Transport { message } => message.clone(),
            Self::Auth(e) => e.to_string(),
            Self::Audit(e) => e.to_string(),
        }
    }
}
