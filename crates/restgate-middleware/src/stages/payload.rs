//! Request body normalization.
//!
//! The body is decoded (JSON, or form fields for
//! `application/x-www-form-urlencoded`) and classified by shape. Accepted
//! shapes are wrapped under the route's entity name; anything else aborts
//! with `400 Bad Request` before business logic runs.

use crate::context::{GateContext, Lifecycle};
use crate::middleware::{BoxFuture, Flow, Middleware, Next};
use crate::types::Request;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use restgate_core::payload::decode_body;
use restgate_core::{GateError, NormalizedPayload, PayloadShape};

/// Validates the request body and stores the canonical payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadMiddleware;

impl PayloadMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn normalize(
        entity: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<NormalizedPayload, GateError> {
        let value = decode_body(content_type, body)?;
        NormalizedPayload::normalize(entity, &value)
    }
}

fn shape_name(shape: &PayloadShape) -> &'static str {
    match shape {
        PayloadShape::Empty => "empty",
        PayloadShape::SingleEntity(_) => "single",
        PayloadShape::BulkByIndex(_) => "bulk",
        PayloadShape::Invalid(_) => "invalid",
    }
}

impl Middleware for PayloadMiddleware {
    fn name(&self) -> &'static str {
        "payload"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut GateContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            ctx.enter(Lifecycle::Normalizing);

            let (parts, body) = request.into_parts();
            let bytes: Bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            let content_type = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());

            match Self::normalize(&ctx.route().entity, content_type, &bytes) {
                Ok(payload) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        entity = payload.entity(),
                        shape = shape_name(payload.shape()),
                        "Payload normalized"
                    );
                    ctx.set_payload(payload);
                }
                Err(e) => {
                    ctx.abort(e).await;
                    return Flow::Aborted;
                }
            }

            let request = Request::from_parts(parts, Full::new(bytes));
            next.run(ctx, request).await
        })
    }
}
