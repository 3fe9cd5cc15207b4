//! # Restgate Core
//!
//! Domain types for the Restgate request middleware.
//!
//! - [`HttpStatus`] - the closed HTTP status vocabulary
//! - [`GateError`] - failure taxonomy shared by all pipeline stages
//! - [`Credentials`] / [`CredentialAliases`] - caller identity from the `Authorization` header
//! - [`FeedbackCollector`] - leveled diagnostics for one request
//! - [`AuditLogStore`] / [`MemoryAuditStore`] - audit record persistence
//! - [`RateLimiter`] - admission control over the audit log
//! - [`NormalizedPayload`] - validated, entity-wrapped request bodies
//! - [`ResponseEnvelope`] - the structured response

#![doc(html_root_url = "https://docs.rs/restgate-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod audit;
pub mod credentials;
mod envelope;
mod error;
mod feedback;
pub mod payload;
pub mod projection;
pub mod ratelimit;
mod request;
mod status;

pub use audit::{
    AuditError, AuditHandle, AuditLogStore, AuditPatch, AuditQuery, AuditRecord, BoxFuture,
    MemoryAuditStore,
};
pub use credentials::{AuthError, CredentialAliases, CredentialRole, Credentials, DEFAULT_KEYWORD};
pub use envelope::{
    is_empty_value, EnvelopeMeta, EnvelopeStatus, RequestMetadata, ResponseEnvelope,
    REQUEST_METADATA_KEYS,
};
pub use error::{ErrorKind, GateError};
pub use feedback::{expand_format, FeedbackCollector, FeedbackEntry, FeedbackLevel};
pub use payload::{NormalizedPayload, PayloadShape, ShapeError};
pub use projection::ProjectionRule;
pub use ratelimit::{Decision, RateLimitPolicy, RateLimiter, Window, WindowError};
pub use request::{ConnectionInfo, RequestId, RouteInfo};
pub use status::{HttpStatus, UnsupportedStatus};
