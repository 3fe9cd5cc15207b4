//! Transport gate and credential extraction.
//!
//! Clients identify themselves with
//!
//! ```text
//! Authorization: TRUEREST username=john&apikey=abc123&class=Customer
//! ```
//!
//! The header is parsed once per request (see [`GateContext::credentials`]).
//! An unusable header is a warning, not an abort: the caller simply has no
//! class, and later stages decide what that means.

use crate::context::{GateContext, Lifecycle};
use crate::middleware::{BoxFuture, Flow, Middleware, Next};
use crate::types::Request;
use restgate_core::{AuditPatch, CredentialRole, GateError};

/// Rejects insecure requests when configured, then resolves the caller's
/// identity and records it in the audit log.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialsMiddleware {
    require_secure: bool,
}

impl CredentialsMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new(require_secure: bool) -> Self {
        Self { require_secure }
    }
}

impl Middleware for CredentialsMiddleware {
    fn name(&self) -> &'static str {
        "credentials"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GateContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            ctx.enter(Lifecycle::Authenticating);

            if self.require_secure && !ctx.connection().secure {
                ctx.abort(GateError::transport("A secure channel is required"))
                    .await;
                return Flow::Aborted;
            }

            if let Some(error) = ctx.credential_error().cloned() {
                let error = GateError::from(error);
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    error = %error,
                    "Unusable credentials"
                );
                ctx.feedback_mut().record(error.level(), error.message());
            }

            let username = ctx.credential(CredentialRole::Username).map(str::to_string);
            let apikey = ctx.credential(CredentialRole::ApiKey).map(str::to_string);
            let class = ctx.credential(CredentialRole::Class).map(str::to_string);

            if !ctx.credentials().is_empty() {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    username = username.as_deref(),
                    apikey = apikey.as_deref(),
                    class = class.as_deref(),
                    "Credentials resolved"
                );
            }

            let patch = AuditPatch::new().identity(
                username.as_deref(),
                apikey.as_deref(),
                class.as_deref(),
            );
            ctx.merge_audit(patch).await;

            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditTrail;
    use bytes::Bytes;
    use http_body_util::Full;
    use restgate_config::GateConfig;
    use restgate_core::{
        AuditRecord, ConnectionInfo, FeedbackLevel, HttpStatus, RouteInfo,
    };
    use std::sync::Arc;

    async fn run(stage: CredentialsMiddleware, mut ctx: GateContext) -> (Flow, GateContext) {
        ctx.audit_mut()
            .open(AuditRecord::new("Users", "edit"))
            .await
            .unwrap();
        let next = Next::handler(|_ctx, _req| Box::pin(async { Ok(None) }));
        let flow = stage
            .process(&mut ctx, http::Request::new(Full::new(Bytes::new())), next)
            .await;
        (flow, ctx)
    }

    fn context() -> GateContext {
        GateContext::new(
            Arc::new(GateConfig::default()),
            RouteInfo::new("Users", "edit", "User"),
        )
        .with_audit(AuditTrail::disabled())
    }

    #[tokio::test]
    async fn test_identity_recorded() {
        let ctx = context().with_auth_header("TRUEREST username=john&apikey=abc123&class=Customer");
        let (flow, ctx) = run(CredentialsMiddleware::new(false), ctx).await;

        assert_eq!(flow, Flow::Completed);
        let record = ctx.audit().record().unwrap();
        assert_eq!(record.username.as_deref(), Some("john"));
        assert_eq!(record.apikey.as_deref(), Some("abc123"));
        assert_eq!(record.class.as_deref(), Some("Customer"));
    }

    #[tokio::test]
    async fn test_insecure_request_aborts() {
        let (flow, ctx) = run(CredentialsMiddleware::new(true), context()).await;

        assert_eq!(flow, Flow::Aborted);
        assert_eq!(ctx.status(), HttpStatus::Forbidden);
        assert_eq!(
            ctx.feedback().messages(FeedbackLevel::Error),
            ["A secure channel is required"]
        );
    }

    #[tokio::test]
    async fn test_secure_request_passes() {
        let ctx = context().with_connection(ConnectionInfo::default().secure());
        let (flow, _ctx) = run(CredentialsMiddleware::new(true), ctx).await;
        assert_eq!(flow, Flow::Completed);
    }

    #[tokio::test]
    async fn test_bad_keyword_is_a_warning() {
        let ctx = context().with_auth_header("Basic dXNlcjpwYXNz");
        let (flow, ctx) = run(CredentialsMiddleware::new(false), ctx).await;

        assert_eq!(flow, Flow::Completed);
        assert_eq!(ctx.feedback().messages(FeedbackLevel::Warning).len(), 1);
        assert!(!ctx.feedback().has_errors());
        assert!(ctx.audit().record().unwrap().class.is_none());
    }
}
