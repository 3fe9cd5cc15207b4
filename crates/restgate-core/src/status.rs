//! HTTP status vocabulary.
//!
//! Restgate only ever emits a fixed set of status codes. Each code maps to
//! exactly one reason phrase, and those phrases intentionally keep the
//! historic `Request Time-out` / `Gateway Time-out` spellings that clients of
//! the envelope format already match on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of HTTP statuses a request pipeline can finish with.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
#[repr(u16)]
pub enum HttpStatus {
    /// 200 OK
    #[default]
    Ok = 200,
    /// 400 Bad Request
    BadRequest = 400,
    /// 401 Unauthorized
    Unauthorized = 401,
    /// 402 Payment Required
    PaymentRequired = 402,
    /// 403 Forbidden
    Forbidden = 403,
    /// 404 Not Found
    NotFound = 404,
    /// 405 Method Not Allowed
    MethodNotAllowed = 405,
    /// 406 Not Acceptable
    NotAcceptable = 406,
    /// 407 Proxy Authentication Required
    ProxyAuthenticationRequired = 407,
    /// 408 Request Time-out
    RequestTimeout = 408,
    /// 500 Internal Server Error
    InternalServerError = 500,
    /// 501 Not Implemented
    NotImplemented = 501,
    /// 502 Bad Gateway
    BadGateway = 502,
    /// 503 Service Unavailable
    ServiceUnavailable = 503,
    /// 504 Gateway Time-out
    GatewayTimeout = 504,
}

impl HttpStatus {
    /// Every status in the vocabulary, ordered by code.
    pub const ALL: [HttpStatus; 15] = [
        Self::Ok,
        Self::BadRequest,
        Self::Unauthorized,
        Self::PaymentRequired,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotAllowed,
        Self::NotAcceptable,
        Self::ProxyAuthenticationRequired,
        Self::RequestTimeout,
        Self::InternalServerError,
        Self::NotImplemented,
        Self::BadGateway,
        Self::ServiceUnavailable,
        Self::GatewayTimeout,
    ];

    /// Returns the numeric status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Returns the reason phrase for this status.
    #[must_use]
    pub const fn reason_phrase(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::PaymentRequired => "Payment Required",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::NotAcceptable => "Not Acceptable",
            Self::ProxyAuthenticationRequired => "Proxy Authentication Required",
            Self::RequestTimeout => "Request Time-out",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::BadGateway => "Bad Gateway",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::GatewayTimeout => "Gateway Time-out",
        }
    }

    /// Looks up a status by its numeric code.
    ///
    /// Returns `None` for codes outside the vocabulary.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Renders the HTTP/1.1 status line, e.g. `HTTP/1.1 403 Forbidden`.
    #[must_use]
    pub fn status_line(self) -> String {
        format!("HTTP/1.1 {} {}", self.code(), self.reason_phrase())
    }

    /// Converts to the `http` crate's status code type.
    #[must_use]
    pub fn to_http(self) -> http::StatusCode {
        http::StatusCode::from_u16(self.code()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason_phrase())
    }
}

impl From<HttpStatus> for u16 {
    fn from(status: HttpStatus) -> Self {
        status.code()
    }
}

/// Error returned when converting a code outside the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP status code: {0}")]
pub struct UnsupportedStatus(pub u16);

impl TryFrom<u16> for HttpStatus {
    type Error = UnsupportedStatus;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(UnsupportedStatus(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_has_its_phrase() {
        let expected = [
            (200, "OK"),
            (400, "Bad Request"),
            (401, "Unauthorized"),
            (402, "Payment Required"),
            (403, "Forbidden"),
            (404, "Not Found"),
            (405, "Method Not Allowed"),
            (406, "Not Acceptable"),
            (407, "Proxy Authentication Required"),
            (408, "Request Time-out"),
            (500, "Internal Server Error"),
            (501, "Not Implemented"),
            (502, "Bad Gateway"),
            (503, "Service Unavailable"),
            (504, "Gateway Time-out"),
        ];

        for (code, phrase) in expected {
            let status = HttpStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
            assert_eq!(status.reason_phrase(), phrase);
        }
        assert_eq!(HttpStatus::ALL.len(), expected.len());
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        assert!(HttpStatus::from_code(429).is_none());
        assert_eq!(HttpStatus::try_from(418), Err(UnsupportedStatus(418)));
    }

    #[test]
    fn test_status_line() {
        assert_eq!(HttpStatus::Forbidden.status_line(), "HTTP/1.1 403 Forbidden");
        assert_eq!(
            HttpStatus::GatewayTimeout.status_line(),
            "HTTP/1.1 504 Gateway Time-out"
        );
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&HttpStatus::BadRequest).unwrap();
        assert_eq!(json, "400");
        let back: HttpStatus = serde_json::from_str("503").unwrap();
        assert_eq!(back, HttpStatus::ServiceUnavailable);
    }

    #[test]
    fn test_to_http() {
        assert_eq!(HttpStatus::NotFound.to_http(), http::StatusCode::NOT_FOUND);
    }
}
