//! Common types used throughout the request pipeline.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use restgate_core::{HttpStatus, ResponseEnvelope};
use serde_json::Value;

/// The HTTP request type used in the pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Header carrying the final status line, e.g. `HTTP/1.1 408 Request Time-out`.
pub const STATUS_HEADER: &str = "x-restgate-status";

/// What business logic hands back: optional output data, or an abort.
pub type HandlerResult = Result<Option<Value>, crate::Abort>;

/// Extension trait for building pipeline responses.
pub trait ResponseExt {
    /// Creates a JSON response carrying the serialized envelope.
    ///
    /// The envelope itself is attached to the response extensions so hosts
    /// can render other output formats from it.
    fn envelope(status: HttpStatus, envelope: ResponseEnvelope) -> Response;

    /// Creates a plain JSON response.
    fn json(status: StatusCode, body: &Value) -> Response;
}

impl ResponseExt for Response {
    fn envelope(status: HttpStatus, envelope: ResponseEnvelope) -> Response {
        let body = envelope.to_json().unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize response envelope");
            b"{}".to_vec()
        });

        let mut response = json_response(status.to_http(), Bytes::from(body));
        if let Ok(value) = HeaderValue::from_str(&status.status_line()) {
            response.headers_mut().insert(STATUS_HEADER, value);
        }
        response.extensions_mut().insert(envelope);
        response
    }

    fn json(status: StatusCode, body: &Value) -> Response {
        json_response(status, Bytes::from(body.to_string()))
    }
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
