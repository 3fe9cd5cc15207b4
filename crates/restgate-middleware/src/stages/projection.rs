//! Result projection.
//!
//! Reshapes the business result on the way out, using the projection rules
//! configured for the route's action. Actions without rules pass their
//! result through untouched.

use crate::context::GateContext;
use crate::middleware::{BoxFuture, Flow, Middleware, Next};
use crate::types::Request;
use indexmap::IndexMap;
use restgate_config::GateConfig;
use restgate_core::ProjectionRule;

/// Applies per-action projection rules to the business result.
#[derive(Debug, Clone, Default)]
pub struct ProjectionMiddleware {
    rules: IndexMap<String, Vec<ProjectionRule>>,
}

impl ProjectionMiddleware {
    /// Creates the stage from an action → rules table.
    #[must_use]
    pub fn new(rules: IndexMap<String, Vec<ProjectionRule>>) -> Self {
        Self { rules }
    }

    /// Creates the stage from the configured projection table.
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.projections.clone())
    }

    /// Rules for an action. Empty if none are configured.
    #[must_use]
    pub fn rules_for(&self, action: &str) -> &[ProjectionRule] {
        self.rules.get(action).map_or(&[], Vec::as_slice)
    }
}

impl Middleware for ProjectionMiddleware {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GateContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let flow = next.run(ctx, request).await;
            if flow.is_aborted() {
                return flow;
            }

            let rules = self.rules_for(&ctx.route().action);
            if rules.is_empty() {
                return flow;
            }
            if let Some(projected) = ctx
                .result()
                .map(|result| restgate_core::projection::project(rules, result))
            {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    action = %ctx.route().action,
                    rules = rules.len(),
                    "Projected business result"
                );
                ctx.set_result(projected);
            }
            flow
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Abort;
    use bytes::Bytes;
    use http_body_util::Full;
    use restgate_core::RouteInfo;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn stage() -> ProjectionMiddleware {
        let mut rules = IndexMap::new();
        rules.insert(
            "view".to_string(),
            vec![
                ProjectionRule::Same("User.name".into()),
                ProjectionRule::Mapped {
                    from: "User.Profile.city".into(),
                    to: "city".into(),
                },
            ],
        );
        ProjectionMiddleware::new(rules)
    }

    fn context(action: &str) -> GateContext {
        GateContext::new(
            Arc::new(GateConfig::default()),
            RouteInfo::new("Users", action, "User"),
        )
    }

    async fn run(ctx: &mut GateContext, result: Value) -> Flow {
        let next = Next::handler(move |_ctx, _req| Box::pin(async move { Ok(Some(result)) }));
        stage()
            .process(ctx, http::Request::new(Full::new(Bytes::new())), next)
            .await
    }

    #[tokio::test]
    async fn test_projects_configured_action() {
        let mut ctx = context("view");
        let result = json!({
            "User": {"name": "john", "password": "x", "Profile": {"city": "Utrecht"}}
        });

        assert_eq!(run(&mut ctx, result).await, Flow::Completed);
        assert_eq!(
            ctx.result(),
            Some(&json!({"User": {"name": "john"}, "city": "Utrecht"}))
        );
    }

    #[tokio::test]
    async fn test_unconfigured_action_passes_through() {
        let mut ctx = context("index");
        let result = json!({"User": {"name": "john"}});

        run(&mut ctx, result.clone()).await;
        assert_eq!(ctx.result(), Some(&result));
    }

    #[tokio::test]
    async fn test_aborted_result_untouched() {
        let mut ctx = context("view");
        let next = Next::handler(|_ctx, _req| Box::pin(async { Err(Abort::new("denied")) }));

        let flow = stage()
            .process(&mut ctx, http::Request::new(Full::new(Bytes::new())), next)
            .await;
        assert!(flow.is_aborted());
        assert!(ctx.result().is_none());
    }

    #[test]
    fn test_from_config() {
        let config = GateConfig::builder()
            .projection("view", vec![ProjectionRule::Same("User.id".into())])
            .build();
        let stage = ProjectionMiddleware::from_config(&config);
        assert_eq!(stage.rules_for("view").len(), 1);
        assert!(stage.rules_for("edit").is_empty());
    }
}
