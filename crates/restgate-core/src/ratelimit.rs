//! Admission control backed by the audit log.
//!
//! Each caller class has a [`RateLimitPolicy`]: at most `max_requests`
//! requests per look-back [`Window`]. The limiter counts committed audit
//! records carrying the caller's identity value and rejects once the count
//! reaches the maximum.
//!
//! Counting is best-effort. Two concurrent requests from the same identity
//! can both observe a count below the limit and both be admitted.

use crate::audit::{AuditLogStore, AuditQuery};
use crate::credentials::CredentialRole;
use crate::error::GateError;
use crate::feedback::expand_format;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default rejection message. Arguments are the maximum and the window label.
pub const DEFAULT_MESSAGE: &str = "You have reached your ratelimit (> %s requests in %s)";

/// Errors parsing a [`Window`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// The string is not `<N> <unit>`.
    #[error("invalid rate-limit window '{0}': expected '[-]<N> <unit>'")]
    Syntax(String),

    /// The unit is not recognized.
    #[error("invalid rate-limit window unit '{0}'")]
    Unit(String),

    /// The window has no length.
    #[error("rate-limit window must be longer than zero: '{0}'")]
    Empty(String),
}

/// A look-back duration written in relative-time form, e.g. `-1 hour`.
///
/// The sign is accepted and ignored: a window always looks back from now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Window {
    raw: String,
    duration: Duration,
}

impl Window {
    /// The window length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Human-readable label used in messages: `-1 hour` becomes `1 hour`.
    #[must_use]
    pub fn label(&self) -> String {
        self.raw.replace('-', "").trim().to_string()
    }

    /// Start of the window ending at `now`.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration
    }
}

impl FromStr for Window {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let unsigned = raw.trim_start_matches(['-', '+']).trim_start();
        let split = unsigned
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(unsigned.len());
        let (number, unit) = unsigned.split_at(split);
        let amount: i64 = number
            .parse()
            .map_err(|_| WindowError::Syntax(raw.to_string()))?;

        let unit = unit.trim().to_ascii_lowercase();
        let seconds_per_unit = match unit.as_str() {
            "second" | "seconds" | "sec" | "secs" => 1,
            "minute" | "minutes" | "min" | "mins" => 60,
            "hour" | "hours" => 3_600,
            "day" | "days" => 86_400,
            "week" | "weeks" => 604_800,
            "" => return Err(WindowError::Syntax(raw.to_string())),
            other => return Err(WindowError::Unit(other.to_string())),
        };

        if amount == 0 {
            return Err(WindowError::Empty(raw.to_string()));
        }

        let duration = amount
            .checked_mul(seconds_per_unit)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| WindowError::Syntax(raw.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            duration,
        })
    }
}

impl TryFrom<String> for Window {
    type Error = WindowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Window> for String {
    fn from(window: Window) -> Self {
        window.raw
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Per-class admission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitPolicy {
    /// Look-back window.
    pub window: Window,
    /// Maximum requests admitted within the window.
    pub max_requests: u64,
}

impl RateLimitPolicy {
    /// Creates a policy from a window string.
    ///
    /// # Errors
    ///
    /// Returns a [`WindowError`] if the window cannot be parsed.
    pub fn new(window: &str, max_requests: u64) -> Result<Self, WindowError> {
        Ok(Self {
            window: window.parse()?,
            max_requests,
        })
    }

    /// Returns true if a request with `count` prior matches is admitted.
    #[must_use]
    pub const fn admits(&self, count: u64) -> bool {
        count < self.max_requests
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The caller is within its policy.
    Admitted {
        /// Prior matching requests.
        count: u64,
        /// Policy maximum.
        max_requests: u64,
    },
    /// The caller exceeded its policy.
    Rejected(GateError),
    /// No policy applies to this caller class.
    UnknownClass(Option<String>),
}

impl Decision {
    /// Returns true unless the request was rejected.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Evaluates per-class policies against the audit log.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    ident_field: String,
    class_limits: IndexMap<String, RateLimitPolicy>,
    message: String,
}

impl RateLimiter {
    /// Creates a limiter counting prior requests by `ident_field`.
    #[must_use]
    pub fn new(ident_field: impl Into<String>, class_limits: IndexMap<String, RateLimitPolicy>) -> Self {
        Self {
            ident_field: ident_field.into(),
            class_limits,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }

    /// Overrides the rejection message format.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// The identity field name.
    #[must_use]
    pub fn ident_field(&self) -> &str {
        &self.ident_field
    }

    /// Policy for a class, if one is configured.
    #[must_use]
    pub fn policy(&self, class: &str) -> Option<&RateLimitPolicy> {
        self.class_limits.get(class)
    }

    /// Decides whether a caller is admitted.
    ///
    /// `identity` is the caller's value for the identity field, already
    /// resolved through the credential aliases.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if no identity field is configured or
    /// the audit store cannot answer the count query.
    pub async fn check(
        &self,
        store: &dyn AuditLogStore,
        class: Option<&str>,
        identity: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Decision, GateError> {
        if self.ident_field.is_empty() {
            return Err(GateError::config(
                "Rate limiting requires an identity field to count requests by",
            ));
        }

        let Some((class, policy)) = class.and_then(|c| self.class_limits.get_key_value(c)) else {
            return Ok(Decision::UnknownClass(class.map(str::to_string)));
        };

        let query = AuditQuery {
            field: self.record_field().to_string(),
            value: identity.map(str::to_string),
            requested_after: policy.window.cutoff(now),
        };
        let count = store
            .count(query)
            .await
            .map_err(|e| GateError::config(format!("Rate limit query failed: {e}")))?;

        if policy.admits(count) {
            return Ok(Decision::Admitted {
                count,
                max_requests: policy.max_requests,
            });
        }

        let message = expand_format(&self.message, &[&policy.max_requests, &policy.window.label()]);
        Ok(Decision::Rejected(GateError::rate_limited(
            message,
            class.clone(),
            count,
            policy.max_requests,
        )))
    }

    /// The audit record column prior requests are counted by.
    ///
    /// Audit records store identities under their logical role names, so a
    /// role name is used as is. Anything else must name a record column.
    #[must_use]
    pub fn record_field(&self) -> &str {
        self.ident_field
            .parse::<CredentialRole>()
            .map_or(self.ident_field.as_str(), |role| role.as_str())
    }
}
