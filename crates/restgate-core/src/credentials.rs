//! Caller credentials parsed from the `Authorization` header.
//!
//! Clients authenticate with a header of the form:
//!
//! ```text
//! Authorization: TRUEREST username=john&apikey=247b5a2f72df&class=Customer
//! ```
//!
//! The leading token is a shared keyword (not a signature). Everything after
//! the first whitespace is a URL-encoded query string that becomes the
//! [`Credentials`] mapping.
//!
//! Three logical roles ([`CredentialRole`]) are looked up through an alias
//! table ([`CredentialAliases`]) so deployments can rename the fields their
//! clients send without touching the pipeline.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The keyword used when none is configured.
pub const DEFAULT_KEYWORD: &str = "TRUEREST";

/// Logical credential roles the pipeline cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialRole {
    /// The caller's class, used to pick a rate-limit policy.
    Class,
    /// The caller's API key.
    #[serde(rename = "apikey")]
    ApiKey,
    /// The caller's user name.
    Username,
}

impl CredentialRole {
    /// All roles in their canonical order.
    pub const ALL: [CredentialRole; 3] = [Self::Class, Self::ApiKey, Self::Username];

    /// Returns the logical name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::ApiKey => "apikey",
            Self::Username => "username",
        }
    }
}

impl fmt::Display for CredentialRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "class" => Ok(Self::Class),
            "apikey" => Ok(Self::ApiKey),
            "username" => Ok(Self::Username),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

/// Maps each logical role to the field name clients actually send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialAliases {
    /// Field carrying the caller class.
    #[serde(default = "default_class_field")]
    pub class: String,
    /// Field carrying the API key.
    #[serde(default = "default_apikey_field")]
    pub apikey: String,
    /// Field carrying the user name.
    #[serde(default = "default_username_field")]
    pub username: String,
}

impl Default for CredentialAliases {
    fn default() -> Self {
        Self {
            class: default_class_field(),
            apikey: default_apikey_field(),
            username: default_username_field(),
        }
    }
}

fn default_class_field() -> String {
    "class".to_string()
}

fn default_apikey_field() -> String {
    "apikey".to_string()
}

fn default_username_field() -> String {
    "username".to_string()
}

impl CredentialAliases {
    /// Returns the configured field name for a role.
    #[must_use]
    pub fn field(&self, role: CredentialRole) -> &str {
        match role {
            CredentialRole::Class => &self.class,
            CredentialRole::ApiKey => &self.apikey,
            CredentialRole::Username => &self.username,
        }
    }

    /// Iterates `(role, field name)` pairs in canonical role order.
    pub fn iter(&self) -> impl Iterator<Item = (CredentialRole, &str)> + '_ {
        CredentialRole::ALL
            .into_iter()
            .map(move |role| (role, self.field(role)))
    }
}

/// Reasons the `Authorization` header could not be turned into credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The leading token did not match the shared keyword.
    #[error("authorization keyword mismatch: expected '{expected}', found '{found}'")]
    KeywordMismatch {
        /// The configured keyword.
        expected: String,
        /// What the client sent.
        found: String,
    },

    /// The header was present but unusable.
    #[error("malformed authorization header: {0}")]
    Malformed(String),

    /// A role name outside `class`, `apikey`, `username`.
    #[error("unknown credential role: {0}")]
    UnknownRole(String),
}

/// Ordered field → value mapping parsed from the header.
///
/// Lookups never distinguish a missing field from a missing alias: both
/// resolve to `None`, which is different from an empty string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(IndexMap<String, String>);

impl Credentials {
    /// Creates an empty credential set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `Authorization` header value.
    ///
    /// The first whitespace-separated token must equal `keyword`. The
    /// remainder is decoded as `application/x-www-form-urlencoded`; later
    /// duplicates of a field overwrite earlier ones but keep the original
    /// position.
    ///
    /// # Example
    ///
    /// ```
    /// use restgate_core::Credentials;
    ///
    /// let creds = Credentials::parse_header(
    ///     "TRUEREST username=john&apikey=abc123&class=Customer",
    ///     "TRUEREST",
    /// ).unwrap();
    /// assert_eq!(creds.get("apikey"), Some("abc123"));
    /// ```
    pub fn parse_header(value: &str, keyword: &str) -> Result<Self, AuthError> {
        let value = value.trim();
        let (token, rest) = value
            .split_once(char::is_whitespace)
            .unwrap_or((value, ""));

        if token != keyword {
            return Err(AuthError::KeywordMismatch {
                expected: keyword.to_string(),
                found: token.to_string(),
            });
        }

        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(rest.trim())
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        Ok(pairs.into_iter().collect())
    }

    /// Returns the raw value of a field, without alias resolution.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Resolves a field, falling back to the alias table.
    ///
    /// `field` is first looked up verbatim. If that misses and `field` names
    /// a logical role (`class`, `apikey`, `username`), the configured alias
    /// for that role is tried instead.
    #[must_use]
    pub fn resolve(&self, field: &str, aliases: &CredentialAliases) -> Option<&str> {
        if let Some(value) = self.get(field) {
            return Some(value);
        }

        let role = field.parse::<CredentialRole>().ok()?;
        self.get(aliases.field(role))
    }

    /// Resolves a logical role through the alias table.
    #[must_use]
    pub fn role(&self, role: CredentialRole, aliases: &CredentialAliases) -> Option<&str> {
        self.resolve(role.as_str(), aliases)
    }

    /// Returns the full mapping.
    #[must_use]
    pub fn as_map(&self) -> &IndexMap<String, String> {
        &self.0
    }

    /// Returns true if no fields were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of parsed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = IndexMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HEADER: &str = "TRUEREST username=john&apikey=abc123&class=Customer";

    #[test]
    fn test_parses_header() {
        let creds = Credentials::parse_header(HEADER, DEFAULT_KEYWORD).unwrap();
        assert_eq!(creds.len(), 3);
        assert_eq!(creds.get("username"), Some("john"));
        assert_eq!(creds.get("apikey"), Some("abc123"));
        assert_eq!(creds.get("class"), Some("Customer"));

        let order: Vec<_> = creds.as_map().keys().cloned().collect();
        assert_eq!(order, vec!["username", "apikey", "class"]);
    }

    #[test]
    fn test_rejects_wrong_keyword() {
        let err = Credentials::parse_header("Bearer abc.def", DEFAULT_KEYWORD).unwrap_err();
        assert!(matches!(err, AuthError::KeywordMismatch { ref found, .. } if found == "Bearer"));
    }

    #[test]
    fn test_keyword_only_yields_empty_credentials() {
        let creds = Credentials::parse_header("TRUEREST", DEFAULT_KEYWORD).unwrap();
        assert!(creds.is_empty());
    }

    #[test]
    fn test_decodes_url_encoding() {
        let creds =
            Credentials::parse_header("TRUEREST username=j%C3%B6rg+m&x=a%26b", DEFAULT_KEYWORD)
                .unwrap();
        assert_eq!(creds.get("username"), Some("jörg m"));
        assert_eq!(creds.get("x"), Some("a&b"));
    }

    #[test]
    fn test_resolve_falls_back_to_alias() {
        let aliases = CredentialAliases {
            apikey: "key".to_string(),
            ..Default::default()
        };
        let creds = Credentials::parse_header("TRUEREST key=k-1&user=bob", "TRUEREST").unwrap();

        assert_eq!(creds.resolve("apikey", &aliases), Some("k-1"));
        assert_eq!(creds.resolve("key", &aliases), Some("k-1"));
        assert_eq!(creds.role(CredentialRole::ApiKey, &aliases), Some("k-1"));
        assert_eq!(creds.resolve("username", &aliases), None);
        assert_eq!(creds.resolve("nonsense", &aliases), None);
    }

    #[test]
    fn test_missing_is_distinct_from_empty() {
        let creds = Credentials::parse_header("TRUEREST class=", "TRUEREST").unwrap();
        let aliases = CredentialAliases::default();
        assert_eq!(creds.resolve("class", &aliases), Some(""));
        assert_eq!(creds.resolve("apikey", &aliases), None);
    }

    #[test]
    fn test_alias_iteration_order() {
        let aliases = CredentialAliases::default();
        let fields: Vec<_> = aliases.iter().map(|(_, f)| f.to_string()).collect();
        assert_eq!(fields, vec!["class", "apikey", "username"]);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("apikey".parse::<CredentialRole>(), Ok(CredentialRole::ApiKey));
        assert!("password".parse::<CredentialRole>().is_err());
    }

    proptest! {
        #[test]
        fn prop_foreign_keyword_never_yields_credentials(
            keyword in "[A-Z]{3,10}",
            value in "[a-z0-9]{1,12}",
        ) {
            prop_assume!(keyword != DEFAULT_KEYWORD);
            let header = format!("{keyword} apikey={value}");
            prop_assert!(Credentials::parse_header(&header, DEFAULT_KEYWORD).is_err());
        }

        #[test]
        fn prop_parsed_values_are_resolvable(
            username in "[a-zA-Z0-9]{1,16}",
            apikey in "[a-f0-9]{8,32}",
        ) {
            let header = format!("TRUEREST username={username}&apikey={apikey}");
            let creds = Credentials::parse_header(&header, DEFAULT_KEYWORD).unwrap();
            let aliases = CredentialAliases::default();
            prop_assert_eq!(creds.role(CredentialRole::Username, &aliases), Some(username.as_str()));
            prop_assert_eq!(creds.role(CredentialRole::ApiKey, &aliases), Some(apikey.as_str()));
        }
    }
}
