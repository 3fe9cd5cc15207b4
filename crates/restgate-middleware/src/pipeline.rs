//! Fixed-order request pipeline.
//!
//! This module implements the orchestrator every routed request flows
//! through. The core stage order is fixed:
//!
//! 1. **Audit log** - open the request's audit record
//! 2. **Credentials** - transport gate, credential extraction
//! 3. **Payload** - body decoding and normalization
//! 4. **Projection** - reshape the business result (post-handler)
//! 5. **Rate limit** - admission control (only when enabled)
//!
//! Extra stages added through [`PipelineBuilder::add_stage`] run after the
//! core stages, immediately around business logic.
//!
//! Whatever happens inside the chain, the pipeline then builds the envelope
//! and commits the audit record exactly once.

use crate::audit::AuditTrail;
use crate::context::GateContext;
use crate::envelope::EnvelopeBuilder;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::{
    AuditLogMiddleware, CredentialsMiddleware, PayloadMiddleware, ProjectionMiddleware,
    RateLimitMiddleware,
};
use crate::types::{HandlerResult, Request, Response, ResponseExt};
use http::header::{HeaderValue, AUTHORIZATION, HOST, USER_AGENT};
use http::StatusCode;
use restgate_config::GateConfig;
use restgate_core::{AuditLogStore, ConnectionInfo, RequestMetadata, RouteInfo};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Instrument;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Header carrying the request ID on every enveloped response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The request pipeline.
///
/// The core stages are chosen from the configuration at build time and
/// cannot be reordered afterwards.
///
/// # Example
///
/// ```
/// use restgate_config::GateConfig;
/// use restgate_middleware::Pipeline;
///
/// let pipeline = Pipeline::builder(GateConfig::default()).build();
/// assert_eq!(
///     pipeline.stage_names(),
///     ["audit_log", "credentials", "payload", "projection", "rate_limit"]
/// );
/// ```
pub struct Pipeline {
    config: Arc<GateConfig>,
    store: Option<Arc<dyn AuditLogStore>>,
    stages: Vec<BoxedMiddleware>,
    envelope: EnvelopeBuilder,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("audit_store", &self.store.is_some())
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder(config: GateConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// The configuration requests run under.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Processes a request through the entire pipeline.
    ///
    /// The request must carry a [`RouteInfo`] extension; a
    /// [`ConnectionInfo`] extension is used when present. Requests without
    /// a route, or whose extension is not enabled, skip the pipeline: the
    /// handler runs and its data is returned as plain JSON.
    ///
    /// Never fails: every outcome, including aborts, is a response.
    pub async fn process<H>(&self, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut GateContext, Request) -> BoxFuture<'static, HandlerResult>
            + Send
            + 'static,
    {
        let route = request.extensions().get::<RouteInfo>().cloned();
        match route {
            Some(route) if self.config.is_enabled_for(route.extension.as_deref()) => {
                self.process_enabled(route, request, handler).await
            }
            route => self.pass_through(route, request, handler).await,
        }
    }

    async fn process_enabled<H>(&self, route: RouteInfo, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut GateContext, Request) -> BoxFuture<'static, HandlerResult>
            + Send
            + 'static,
    {
        let _in_flight = restgate_telemetry::metrics::InFlightGuard::new();

        let connection = request
            .extensions()
            .get::<ConnectionInfo>()
            .cloned()
            .unwrap_or_default();
        let metadata = request_metadata(&request, &connection);
        let audit = self
            .store
            .clone()
            .map_or_else(AuditTrail::disabled, AuditTrail::new);

        let mut ctx = GateContext::new(Arc::clone(&self.config), route)
            .with_connection(connection)
            .with_metadata(metadata)
            .with_audit(audit);
        if let Some(value) = request.headers().get(AUTHORIZATION) {
            ctx = ctx.with_auth_header(String::from_utf8_lossy(value.as_bytes()));
        }

        let span = tracing::info_span!(
            "restgate.request",
            request_id = %ctx.request_id(),
            controller = %ctx.route().controller,
            action = %ctx.route().action,
        );
        let chain = self.build_chain(handler);
        chain.run(&mut ctx, request).instrument(span).await;

        let mut envelope = self.envelope.build(&mut ctx).await;
        if !ctx.finalize().await.is_empty() {
            envelope.meta.feedback = ctx.feedback().flatten();
            envelope.meta.status = ctx.feedback().status();
        }

        let status = ctx.status();
        let elapsed = ctx.elapsed();
        restgate_telemetry::metrics::record_request(status.code(), elapsed);
        if !ctx.is_aborted() {
            restgate_telemetry::log_request_complete!(
                ctx.request_id(),
                status.code(),
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            );
        }

        let mut response = Response::envelope(status, envelope);
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }

    async fn pass_through<H>(&self, route: Option<RouteInfo>, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut GateContext, Request) -> BoxFuture<'static, HandlerResult>
            + Send
            + 'static,
    {
        let route = route.unwrap_or_else(|| RouteInfo::new("", "", ""));
        tracing::debug!(
            controller = %route.controller,
            extension = route.extension.as_deref(),
            "Extension not enabled; bypassing pipeline"
        );

        let mut ctx = GateContext::new(Arc::clone(&self.config), route);
        match handler(&mut ctx, request).await {
            Ok(data) => Response::json(StatusCode::OK, &data.unwrap_or(Value::Null)),
            Err(abort) => Response::json(abort.status().to_http(), &json!({ "error": abort.message() })),
        }
    }

    /// Builds the middleware chain for a request.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut GateContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a,
    {
        // Start with the handler as the terminal point
        let mut next = Next::handler(handler);

        // Wrap with stages in reverse order
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        next
    }

    /// Returns the names of all middleware stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Allow-listed transport metadata in CGI-style naming.
fn request_metadata(request: &Request, connection: &ConnectionInfo) -> RequestMetadata {
    let header = |name: http::header::HeaderName| {
        request
            .headers()
            .get(name)
            .and_then(|v: &HeaderValue| v.to_str().ok())
            .map(str::to_string)
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let pairs = [
        ("HTTP_HOST", header(HOST).or_else(|| request.uri().host().map(str::to_string))),
        ("HTTP_USER_AGENT", header(USER_AGENT)),
        ("REMOTE_ADDR", connection.remote_addr.clone()),
        ("REQUEST_METHOD", Some(request.method().to_string())),
        ("REQUEST_TIME", Some(now.to_string())),
        ("REQUEST_URI", Some(request.uri().to_string())),
        ("SERVER_ADDR", connection.server_addr.clone()),
        ("SERVER_PROTOCOL", Some(format!("{:?}", request.version()))),
    ];
    RequestMetadata::from_pairs(
        pairs
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v))),
    )
}

/// Builder for constructing a [`Pipeline`].
pub struct PipelineBuilder {
    config: GateConfig,
    store: Option<Arc<dyn AuditLogStore>>,
    extra_stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates a builder for the given configuration.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            store: None,
            extra_stages: Vec::new(),
        }
    }

    /// Sets the audit log store.
    ///
    /// Ignored when `log.enabled` is false.
    #[must_use]
    pub fn audit_store(mut self, store: Arc<dyn AuditLogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds a stage that runs after the core stages.
    #[must_use]
    pub fn add_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.extra_stages.push(Arc::new(middleware));
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let config = self.config;
        let store = if config.log.enabled {
            self.store
        } else {
            if self.store.is_some() {
                tracing::debug!("Audit logging disabled; ignoring configured store");
            }
            None
        };

        let mut stages: Vec<BoxedMiddleware> = vec![
            Arc::new(AuditLogMiddleware::new()),
            Arc::new(CredentialsMiddleware::new(config.auth.require_secure)),
            Arc::new(PayloadMiddleware::new()),
            Arc::new(ProjectionMiddleware::from_config(&config)),
        ];
        if config.rate_limit.enabled {
            stages.push(Arc::new(RateLimitMiddleware::new(
                config.rate_limit.limiter(),
                config.rate_limit.phase,
            )));
        }
        stages.extend(self.extra_stages);

        Pipeline {
            envelope: EnvelopeBuilder::from_config(&config),
            config: Arc::new(config),
            store,
            stages,
        }
    }
}

/// Core pipeline stage marker.
///
/// This enum represents the fixed order of the core stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: Audit record opening
    AuditLog = 1,
    /// Stage 2: Transport gate and credential extraction
    Credentials = 2,
    /// Stage 3: Payload normalization
    Payload = 3,
    /// Stage 4: Result projection
    Projection = 4,
    /// Stage 5: Rate limiting
    RateLimit = 5,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AuditLog => "audit_log",
            Self::Credentials => "credentials",
            Self::Payload => "payload",
            Self::Projection => "projection",
            Self::RateLimit => "rate_limit",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 5] {
        [
            Self::AuditLog,
            Self::Credentials,
            Self::Payload,
            Self::Projection,
            Self::RateLimit,
        ]
    }
}
