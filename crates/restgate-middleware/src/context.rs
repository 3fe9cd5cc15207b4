//! Request-scoped pipeline state.
//!
//! One [`GateContext`] exists per request. It carries the configuration the
//! request runs under, the lazily parsed credentials, collected feedback,
//! the audit trail, the normalized payload and the business result, and it
//! tracks where in the [`Lifecycle`] the request is.

use crate::audit::AuditTrail;
use chrono::Utc;
use restgate_config::GateConfig;
use restgate_core::{
    AuditError, AuditPatch, AuthError, ConnectionInfo, CredentialRole, Credentials, ErrorKind,
    FeedbackCollector, FeedbackLevel, GateError, HttpStatus, NormalizedPayload, RequestId,
    RequestMetadata, RouteInfo,
};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Where a request is in the pipeline.
///
/// `Finalized` and `Aborted` are terminal: once reached, no further
/// transition happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Activation check.
    Init,
    /// Transport gate and credential extraction.
    Authenticating,
    /// Payload classification.
    Normalizing,
    /// Business logic is running.
    AwaitingBusinessLogic,
    /// Admission control.
    RateLimiting,
    /// Envelope assembly.
    BuildingResponse,
    /// Completed normally.
    Finalized,
    /// Terminated early.
    Aborted,
}

impl Lifecycle {
    /// Returns the snake_case state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Authenticating => "authenticating",
            Self::Normalizing => "normalizing",
            Self::AwaitingBusinessLogic => "awaiting_business_logic",
            Self::RateLimiting => "rate_limiting",
            Self::BuildingResponse => "building_response",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
        }
    }

    /// Returns true for `Finalized` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was terminated early.
///
/// Business logic aborts with [`Abort::new`] (403) or
/// [`Abort::with_status`]; stage failures convert from [`GateError`].
///
/// # Example
///
/// ```
/// use restgate_core::HttpStatus;
/// use restgate_middleware::Abort;
///
/// let abort = Abort::new("Not your record");
/// assert_eq!(abort.status(), HttpStatus::Forbidden);
///
/// let abort = Abort::with_status(HttpStatus::NotFound, "No such user");
/// assert_eq!(abort.status().code(), 404);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort {
    status: HttpStatus,
    message: String,
    kind: ErrorKind,
    rate_limited: bool,
}

impl Abort {
    /// Aborts with `403 Forbidden`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_status(HttpStatus::Forbidden, message)
    }

    /// Aborts with an explicit status.
    #[must_use]
    pub fn with_status(status: HttpStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind: ErrorKind::Explicit,
            rate_limited: false,
        }
    }

    /// The status the request finishes with.
    #[must_use]
    pub fn status(&self) -> HttpStatus {
        self.status
    }

    /// The error message recorded as feedback.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if the rate limiter rejected the request.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }
}

impl From<GateError> for Abort {
    fn from(err: GateError) -> Self {
        Self {
            status: err.status(),
            message: err.message(),
            kind: err.kind(),
            rate_limited: matches!(err, GateError::RateLimitExceeded { .. }),
        }
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status.code())
    }
}

#[derive(Debug)]
struct ParsedCredentials {
    credentials: Credentials,
    error: Option<AuthError>,
}

/// State that flows through the pipeline for one request.
pub struct GateContext {
    request_id: RequestId,
    config: Arc<GateConfig>,
    route: RouteInfo,
    connection: ConnectionInfo,
    metadata: RequestMetadata,
    auth_header: Option<String>,
    credentials: OnceLock<ParsedCredentials>,
    feedback: FeedbackCollector,
    audit: AuditTrail,
    payload: Option<NormalizedPayload>,
    result: Option<Value>,
    lifecycle: Lifecycle,
    status: HttpStatus,
    abort: Option<Abort>,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for GateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateContext")
            .field("request_id", &self.request_id)
            .field("route", &self.route)
            .field("lifecycle", &self.lifecycle)
            .field("status", &self.status)
            .field("abort", &self.abort)
            .finish_non_exhaustive()
    }
}

impl GateContext {
    /// Creates a context for a routed request.
    #[must_use]
    pub fn new(config: Arc<GateConfig>, route: RouteInfo) -> Self {
        Self {
            request_id: RequestId::new(),
            config,
            route,
            connection: ConnectionInfo::default(),
            metadata: RequestMetadata::default(),
            auth_header: None,
            credentials: OnceLock::new(),
            feedback: FeedbackCollector::new(),
            audit: AuditTrail::disabled(),
            payload: None,
            result: None,
            lifecycle: Lifecycle::Init,
            status: HttpStatus::Ok,
            abort: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Sets the connection facts.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }

    /// Sets the transport metadata echoed in the envelope.
    #[must_use]
    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the raw `Authorization` header value.
    #[must_use]
    pub fn with_auth_header(mut self, value: impl Into<String>) -> Self {
        self.auth_header = Some(value.into());
        self
    }

    /// Sets the audit trail.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the configuration this request runs under.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Returns the route.
    #[must_use]
    pub fn route(&self) -> &RouteInfo {
        &self.route
    }

    /// Returns the connection facts.
    #[must_use]
    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Returns the allow-listed transport metadata.
    #[must_use]
    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    fn parsed_credentials(&self) -> &ParsedCredentials {
        self.credentials.get_or_init(|| {
            match &self.auth_header {
                None => ParsedCredentials {
                    credentials: Credentials::new(),
                    error: None,
                },
                Some(header) => match Credentials::parse_header(header, &self.config.auth.keyword) {
                    Ok(credentials) => ParsedCredentials {
                        credentials,
                        error: None,
                    },
                    Err(error) => ParsedCredentials {
                        credentials: Credentials::new(),
                        error: Some(error),
                    },
                },
            }
        })
    }

    /// Returns the caller's credentials, parsing the header on first use.
    ///
    /// Unusable headers yield an empty mapping; see
    /// [`credential_error`](Self::credential_error).
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.parsed_credentials().credentials
    }

    /// Returns why the header could not be used, if it could not.
    #[must_use]
    pub fn credential_error(&self) -> Option<&AuthError> {
        self.parsed_credentials().error.as_ref()
    }

    /// Resolves a credential field through the configured alias table.
    #[must_use]
    pub fn resolve(&self, field: &str) -> Option<&str> {
        self.credentials().resolve(field, &self.config.auth.fields)
    }

    /// Resolves a logical credential role.
    #[must_use]
    pub fn credential(&self, role: CredentialRole) -> Option<&str> {
        self.credentials().role(role, &self.config.auth.fields)
    }

    /// Returns the feedback collected so far.
    #[must_use]
    pub fn feedback(&self) -> &FeedbackCollector {
        &self.feedback
    }

    /// Returns the feedback collector for recording.
    pub fn feedback_mut(&mut self) -> &mut FeedbackCollector {
        &mut self.feedback
    }

    /// Returns the audit trail.
    #[must_use]
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Returns the audit trail for opening and committing.
    pub fn audit_mut(&mut self) -> &mut AuditTrail {
        &mut self.audit
    }

    /// Returns the normalized request payload.
    #[must_use]
    pub fn payload(&self) -> Option<&NormalizedPayload> {
        self.payload.as_ref()
    }

    /// Stores the normalized request payload.
    pub fn set_payload(&mut self, payload: NormalizedPayload) {
        self.payload = Some(payload);
    }

    /// Returns the business result.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Stores the business result.
    pub fn set_result(&mut self, data: Value) {
        self.result = Some(data);
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Moves to `state` unless the request already reached a terminal state.
    pub fn enter(&mut self, state: Lifecycle) {
        if self.lifecycle.is_terminal() {
            return;
        }
        tracing::debug!(
            request_id = %self.request_id,
            stage = state.as_str(),
            "Entering stage"
        );
        self.lifecycle = state;
    }

    /// Returns true if the request was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.lifecycle == Lifecycle::Aborted
    }

    /// Returns the abort, if the request was aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&Abort> {
        self.abort.as_ref()
    }

    /// Returns the status the request will finish with.
    #[must_use]
    pub fn status(&self) -> HttpStatus {
        self.status
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Terminates the request.
    ///
    /// Records the message as error feedback, sets the final status and
    /// merges `{httpcode, error}` (and `ratelimited` for rate-limit
    /// rejections) into the audit record. Only the first abort counts.
    pub async fn abort(&mut self, abort: impl Into<Abort>) {
        if self.lifecycle.is_terminal() {
            return;
        }
        let abort = abort.into();

        self.feedback.error(abort.message());
        self.status = abort.status();
        self.lifecycle = Lifecycle::Aborted;

        let mut patch = AuditPatch::new()
            .httpcode(abort.status())
            .error(abort.message());
        if abort.is_rate_limited() {
            patch = patch.ratelimited(true);
        }
        self.merge_audit(patch).await;

        restgate_telemetry::log_request_abort!(self.request_id, abort.status().code(), abort.message());
        restgate_telemetry::metrics::record_abort(abort.kind().as_str());
        self.abort = Some(abort);
    }

    /// Merges a patch into the audit record.
    ///
    /// Store failures become warning feedback and never abort the request.
    pub async fn merge_audit(&mut self, patch: AuditPatch) {
        if let Err(e) = self.audit.merge(patch).await {
            self.audit_failure("merge", e);
        }
    }

    /// Records an audit store failure as a warning.
    pub fn audit_failure(&mut self, operation: &'static str, error: AuditError) {
        let error = GateError::from(error);
        tracing::warn!(
            request_id = %self.request_id,
            operation,
            error = %error,
            "Audit log degraded"
        );
        restgate_telemetry::metrics::record_audit_failure(operation);
        self.feedback.record(error.level(), error.message());
    }

    /// Stamps the response time and final status, then commits the audit
    /// record. Returns the warnings this produced.
    ///
    /// Runs once; later calls return no warnings and touch nothing.
    pub async fn finalize(&mut self) -> Vec<String> {
        if self.audit.is_committed() {
            return Vec::new();
        }
        let before = self.feedback.messages(FeedbackLevel::Warning).len();
        self.enter(Lifecycle::Finalized);

        let patch = AuditPatch::new()
            .responded(Utc::now())
            .httpcode(self.status);
        self.merge_audit(patch).await;
        if let Err(e) = self.audit.commit().await {
            self.audit_failure("commit", e);
        }

        self.feedback
            .messages(FeedbackLevel::Warning)
            .get(before..)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Stores a typed extension value for later stages or business logic.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use restgate_config::GateConfig;
    /// use restgate_core::RouteInfo;
    /// use restgate_middleware::GateContext;
    ///
    /// struct Tenant(&'static str);
    ///
    /// let mut ctx = GateContext::new(Arc::new(GateConfig::default()), RouteInfo::new("Users", "view", "User"));
    /// ctx.set_extension(Tenant("acme"));
    /// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }
}
