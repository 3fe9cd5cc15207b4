//! # Restgate Middleware
//!
//! The request pipeline of the Restgate REST middleware.
//!
//! Every routed request runs through a fixed chain of stages. Whatever
//! happens in the chain, the pipeline builds a response envelope and then
//! commits the request's audit record exactly once.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → AuditLog → Credentials → Payload → Projection → RateLimit → Handler
//!                                                                          ↓
//! Response ← commit ← Envelope ←───────────────────────────────────────────┘
//! ```
//!
//! | Stage | Middleware   | Purpose                                     |
//! |-------|--------------|---------------------------------------------|
//! | 1     | Audit log    | Open the request's audit record             |
//! | 2     | Credentials  | Secure-channel gate, credential extraction  |
//! | 3     | Payload      | Decode and normalize the request body       |
//! | 4     | Projection   | Reshape the business result on the way out  |
//! | 5     | Rate limit   | Admission control against the audit log     |
//!
//! Any stage may abort. An abort is terminal: no later stage and no
//! business logic runs, yet the envelope is still built and the audit
//! record still committed.
//!
//! ## Example
//!
//! ```
//! use restgate_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 5);
//! assert_eq!(stages[0].name(), "audit_log");
//! assert_eq!(stages[4].name(), "rate_limit");
//! ```

#![doc(html_root_url = "https://docs.rs/restgate-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod audit;
pub mod context;
pub mod envelope;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use audit::AuditTrail;
pub use context::{Abort, GateContext, Lifecycle};
pub use envelope::EnvelopeBuilder;
pub use middleware::{BoxFuture, Flow, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage, REQUEST_ID_HEADER};
pub use types::{HandlerResult, Request, Response, ResponseExt, STATUS_HEADER};
