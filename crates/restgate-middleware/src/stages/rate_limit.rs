//! Rate limiting stage.
//!
//! Counts the caller's committed audit records inside the class window and
//! rejects the request with `403 Forbidden` once the class maximum is
//! reached. Counting happens against the audit store, so rate limiting
//! needs audit logging: without a store every request aborts with a
//! configuration error.
//!
//! Callers whose class is missing or has no policy are let through with a
//! warning.
//!
//! Concurrent requests from one identity may both see a count below the
//! limit and both be admitted; the bound is best-effort.

use crate::context::{GateContext, Lifecycle};
use crate::middleware::{BoxFuture, Flow, Middleware, Next};
use crate::types::Request;
use chrono::Utc;
use restgate_config::RateLimitPhase;
use restgate_core::{CredentialRole, Decision, GateError, RateLimiter};
use std::sync::Arc;

/// Message recorded when no policy can be picked for the caller.
pub const UNKNOWN_CLASS_MESSAGE: &str = "Unable to establish class";

/// Admission control over the audit log.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: RateLimiter,
    phase: RateLimitPhase,
}

impl RateLimitMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(limiter: RateLimiter, phase: RateLimitPhase) -> Self {
        Self { limiter, phase }
    }

    /// When the check runs relative to business logic.
    #[must_use]
    pub fn phase(&self) -> RateLimitPhase {
        self.phase
    }

    /// Runs the check. Returns false if the request was aborted.
    async fn admit(&self, ctx: &mut GateContext) -> bool {
        ctx.enter(Lifecycle::RateLimiting);

        let Some(store) = ctx.audit().store().map(Arc::clone) else {
            ctx.abort(GateError::config(
                "Rate limiting requires audit logging to be enabled",
            ))
            .await;
            return false;
        };

        let class = ctx.credential(CredentialRole::Class).map(str::to_string);
        let identity = ctx.resolve(self.limiter.ident_field()).map(str::to_string);

        let decision = self
            .limiter
            .check(store.as_ref(), class.as_deref(), identity.as_deref(), Utc::now())
            .await;

        match decision {
            Ok(Decision::Admitted {
                count,
                max_requests,
            }) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    class = class.as_deref(),
                    count,
                    max_requests,
                    "Request admitted"
                );
                true
            }
            Ok(Decision::UnknownClass(class)) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    class = class.as_deref(),
                    "No rate-limit policy for caller; admitting"
                );
                ctx.feedback_mut().warning(UNKNOWN_CLASS_MESSAGE);
                true
            }
            Ok(Decision::Rejected(error)) => {
                if let GateError::RateLimitExceeded { class, .. } = &error {
                    restgate_telemetry::metrics::record_rate_limited(class);
                }
                ctx.abort(error).await;
                false
            }
            Err(error) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    error = %error,
                    "Rate limit check failed"
                );
                ctx.abort(error).await;
                false
            }
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GateContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            match self.phase {
                RateLimitPhase::BeforeHandler => {
                    if !self.admit(ctx).await {
                        return Flow::Aborted;
                    }
                    next.run(ctx, request).await
                }
                RateLimitPhase::AfterHandler => {
                    let flow = next.run(ctx, request).await;
                    if flow.is_aborted() || !self.admit(ctx).await {
                        return Flow::Aborted;
                    }
                    flow
                }
            }
        })
    }
}
