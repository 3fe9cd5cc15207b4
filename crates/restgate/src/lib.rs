//! # Restgate
//!
//! **Request middleware for data-mutation REST APIs**
//!
//! Restgate sits between routing and business logic and decides, for every
//! request, whether it is well-formed, who is calling, whether the caller
//! may proceed and how the result is shaped:
//!
//! - **Credentials** – `Authorization: TRUEREST username=..&apikey=..&class=..`
//! - **Payload normalization** – one entity, or many keyed by numeric id
//! - **Rate limiting** – per caller class, counted from the audit log
//! - **Audit logging** – one record per request, committed exactly once
//! - **Response envelope** – `{meta: {status, feedback, request, credentials}, data}`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restgate::prelude::*;
//! use std::sync::Arc;
//!
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("restgate.toml")?
//!     .with_env_prefix("RESTGATE")
//!     .load()?;
//! restgate::telemetry::init_telemetry(&config.telemetry.to_telemetry_config())?;
//!
//! let pipeline = Pipeline::builder(config)
//!     .audit_store(Arc::new(MemoryAuditStore::new()))
//!     .build();
//!
//! // `request` carries a `RouteInfo` extension set by the router.
//! let response = pipeline
//!     .process(request, |_ctx, _req| Box::pin(async { Ok(None) }))
//!     .await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → AuditLog → Credentials → Payload → Projection → RateLimit → Handler
//!                                                                          ↓
//! Response ← commit ← Envelope ←───────────────────────────────────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/restgate/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use restgate_core as core;

// Re-export configuration types
pub use restgate_config as config;

// Re-export observability
pub use restgate_telemetry as telemetry;

// Re-export pipeline types
pub use restgate_middleware as middleware;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use restgate::prelude::*;
///
/// let pipeline = Pipeline::builder(GateConfig::default()).build();
/// assert_eq!(pipeline.stage_count(), Stage::all().len());
/// ```
pub mod prelude {
    pub use restgate_core::{
        AuditLogStore, AuditRecord, ConnectionInfo, CredentialRole, FeedbackLevel, GateError,
        HttpStatus, MemoryAuditStore, ResponseEnvelope, RouteInfo,
    };

    pub use restgate_config::{ConfigLoader, GateConfig};

    pub use restgate_middleware::{
        Abort, GateContext, HandlerResult, Middleware, Pipeline, Request, Response, Stage,
    };
}
