//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every pipeline stage
//! implements. A stage receives the request context, the request and a
//! [`Next`] callback. It may work before calling `next`, after it returns,
//! or abort the request by not calling it at all.
//!
//! # Example
//!
//! ```
//! use restgate_middleware::{BoxFuture, Flow, GateContext, Middleware, Next, Request};
//!
//! struct Tagging;
//!
//! impl Middleware for Tagging {
//!     fn name(&self) -> &'static str {
//!         "tagging"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut GateContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Flow> {
//!         Box::pin(async move {
//!             ctx.feedback_mut().info("tagged");
//!             next.run(ctx, request).await
//!         })
//!     }
//! }
//! ```

use crate::context::{GateContext, Lifecycle};
use crate::types::{HandlerResult, Request};

pub use restgate_core::BoxFuture;

/// How the chain below a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Business logic ran and produced its result.
    Completed,
    /// The request was aborted. Nothing after the abort ran.
    Aborted,
}

impl Flow {
    /// Returns true if the request was aborted.
    #[must_use]
    pub const fn is_aborted(self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// A pipeline stage.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once
/// - A stage that aborts calls [`GateContext::abort`] and returns
///   [`Flow::Aborted`] without calling `next`
/// - Stage failures never escape as panics or errors
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    ///
    /// This name is used for logging and debugging.
    fn name(&self) -> &'static str;

    /// Processes the request through this stage.
    fn process<'a>(
        &'a self,
        ctx: &'a mut GateContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Flow>;
}

/// Business logic at the end of the chain.
pub type Handler<'a> =
    Box<dyn FnOnce(&mut GateContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a>;

/// Callback to invoke the next stage in the chain.
///
/// Consumed by [`run`](Next::run), so it can only be invoked once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Handler<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that invokes `middleware`, then `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes business logic.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut GateContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next stage, or business logic at the end of the chain.
    ///
    /// An already aborted request goes no further.
    pub async fn run(self, ctx: &mut GateContext, request: Request) -> Flow {
        if ctx.is_aborted() {
            return Flow::Aborted;
        }

        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => {
                ctx.enter(Lifecycle::AwaitingBusinessLogic);
                match handler(ctx, request).await {
                    Ok(data) => {
                        if let Some(data) = data {
                            ctx.set_result(data);
                        }
                        Flow::Completed
                    }
                    Err(abort) => {
                        ctx.abort(abort).await;
                        Flow::Aborted
                    }
                }
            }
        }
    }
}
