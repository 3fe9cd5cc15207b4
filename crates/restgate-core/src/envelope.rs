//! The response envelope every enabled endpoint returns.
//!
//! ```json
//! {
//!   "meta": {
//!     "status": "ok",
//!     "feedback": [{"message": "...", "level": "info"}],
//!     "request": {"http_host": "api.example.com", "request_method": "PUT"},
//!     "credentials": {"class": "Customer", "apikey": "abc123", "username": null}
//!   },
//!   "data": {}
//! }
//! ```

use crate::feedback::FeedbackEntry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport metadata keys that may be echoed back in `meta.request`.
///
/// Keys arrive in CGI-style upper case and are emitted lower-cased.
pub const REQUEST_METADATA_KEYS: [&str; 8] = [
    "HTTP_HOST",
    "HTTP_USER_AGENT",
    "REMOTE_ADDR",
    "REQUEST_METHOD",
    "REQUEST_TIME",
    "REQUEST_URI",
    "SERVER_ADDR",
    "SERVER_PROTOCOL",
];

/// Overall outcome reported in `meta.status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    /// No error-level feedback was recorded.
    #[default]
    Ok,
    /// At least one error-level feedback entry exists.
    Error,
}

impl EnvelopeStatus {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Allow-listed subset of request transport metadata, with lower-case keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestMetadata(IndexMap<String, String>);

impl RequestMetadata {
    /// Builds the metadata from arbitrary `(key, value)` pairs.
    ///
    /// Pairs whose key is not in [`REQUEST_METADATA_KEYS`] (compared
    /// case-insensitively) are dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use restgate_core::RequestMetadata;
    ///
    /// let meta = RequestMetadata::from_pairs([
    ///     ("HTTP_HOST", "api.example.com"),
    ///     ("HTTP_COOKIE", "secret"),
    /// ]);
    /// assert_eq!(meta.get("http_host"), Some("api.example.com"));
    /// assert_eq!(meta.get("http_cookie"), None);
    /// ```
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = IndexMap::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            if REQUEST_METADATA_KEYS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(key))
            {
                map.insert(key.to_ascii_lowercase(), value.into());
            }
        }
        Self(map)
    }

    /// Returns one value by its lower-case key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no metadata was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The `meta` block of the envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    /// `ok` or `error`.
    pub status: EnvelopeStatus,
    /// Flattened feedback in level-grouped order.
    pub feedback: Vec<FeedbackEntry>,
    /// Allow-listed transport metadata.
    pub request: RequestMetadata,
    /// Every aliased credential field, `null` when absent.
    pub credentials: IndexMap<String, Option<String>>,
}

/// The complete structured response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Status, feedback, request metadata and credentials.
    pub meta: EnvelopeMeta,
    /// Business payload, or the echoed input payload.
    pub data: Value,
}

impl ResponseEnvelope {
    /// Returns the envelope status.
    #[must_use]
    pub fn status(&self) -> EnvelopeStatus {
        self.meta.status
    }

    /// Serializes the envelope to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Returns true if a JSON value carries no data (`null`, `{}`, `[]`, `""`, `false`).
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}
