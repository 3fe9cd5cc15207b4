//! Audit record opening.
//!
//! Opens the single audit record for the request before any other stage
//! runs, so every later outcome (including early aborts) lands in it.

use crate::context::GateContext;
use crate::middleware::{BoxFuture, Flow, Middleware, Next};
use crate::types::Request;
use chrono::Utc;
use restgate_core::AuditRecord;

/// Opens the request's audit record.
///
/// Store failures are recorded as warnings; the request continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogMiddleware;

impl AuditLogMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn initial_record(ctx: &GateContext) -> AuditRecord {
        let route = ctx.route();
        let mut record = AuditRecord::new(route.controller.clone(), route.action.clone());
        record.model_id = route.target_id;
        record.ip = ctx.connection().remote_addr.clone();
        record.requested = Utc::now();
        record
    }
}

impl Middleware for AuditLogMiddleware {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GateContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let record = Self::initial_record(ctx);
            if let Err(e) = ctx.audit_mut().open(record).await {
                ctx.audit_failure("open", e);
            }
            next.run(ctx, request).await
        })
    }
}
