//! Core pipeline stages.
//!
//! Stages run in a fixed order. Each one is an around-middleware: work done
//! before `next` happens on the way in, work done after it returns happens
//! on the way out.
//!
//! 1. [`audit_log`] - open the request's audit record
//! 2. [`credentials`] - transport gate and credential extraction
//! 3. [`payload`] - decode and normalize the request body
//! 4. [`projection`] - reshape the business result (on the way out)
//! 5. [`rate_limit`] - admission control (before or after business logic)

pub mod audit_log;
pub mod credentials;
pub mod payload;
pub mod projection;
pub mod rate_limit;

pub use audit_log::AuditLogMiddleware;
pub use credentials::CredentialsMiddleware;
pub use payload::PayloadMiddleware;
pub use projection::ProjectionMiddleware;
pub use rate_limit::RateLimitMiddleware;
