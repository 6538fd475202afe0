//! Middleware for the Beacon framework.
//!
//! A [`Middleware`] wraps a [`BoxedHandler`] into another `BoxedHandler`.
//! Lists of middleware are folded from the back, so the first-listed
//! middleware ends up outermost:
//!
//! ```text
//! [A, B] around H
//!
//!   A.enter ─▶ B.enter ─▶ H ─▶ B.exit ─▶ A.exit
//! ```
//!
//! Built-in middleware:
//!
//! | Middleware          | Effect                                                      |
//! |---------------------|-------------------------------------------------------------|
//! | [`Recovery`]        | turns panics into [`HandlerError::Panicked`]                |
//! | [`Logging`]         | logs kind, elapsed time and outcome                         |
//! | [`Metrics`]         | writes `message_type`, `processed_at`, `processing_error`   |
//! | [`RateLimit`]       | sliding-window limit per sender                             |
//! | [`Auth`]            | rejects senders outside an allow-list                       |
//! | [`GroupOnly`]       | rejects non-group messages                                  |
//! | [`PrivateOnly`]     | rejects non-private messages                                |
//! | [`Conditional`]     | applies another middleware only when a matcher holds        |
//! | [`Chain`]           | composes several middleware into one                        |
//! | [`LayerMiddleware`] | adapts any compatible `tower::Layer`                        |
//!
//! [`HandlerError::Panicked`]: beacon_core::HandlerError::Panicked

use std::sync::Arc;

use beacon_core::{BoxFuture, BoxedHandler, Handler, HandlerResult, MessageContext};

use crate::matcher::{BoxedMatcher, IntoMatcher};

mod auth;
mod layer;
mod logging;
mod metrics;
mod rate_limit;
pub(crate) mod recovery;
mod scope;

pub use auth::Auth;
pub use layer::{HandlerService, LayerMiddleware, ServiceHandler};
pub use logging::Logging;
pub use metrics::Metrics;
pub use rate_limit::{RateLimit, rate_limit_key};
pub use recovery::Recovery;
pub use scope::{GroupOnly, PrivateOnly};

/// Wraps a handler into another handler.
pub trait Middleware: Send + Sync {
    /// Returns a handler that runs this middleware around `next`.
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// A shared, type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Folds `middleware` around `handler`, first-listed outermost.
pub fn apply(middleware: &[BoxedMiddleware], handler: BoxedHandler) -> BoxedHandler {
    middleware
        .iter()
        .rev()
        .fold(handler, |next, m| m.wrap(next))
}

// ============================================================================
// Chain
// ============================================================================

/// Composes several middleware into one.
#[derive(Clone, Default)]
pub struct Chain {
    middleware: Vec<BoxedMiddleware>,
}

impl Chain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware. It runs inside every middleware added before it.
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already boxed middleware.
    pub fn with_boxed(mut self, middleware: BoxedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Returns the number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

impl Middleware for Chain {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        apply(&self.middleware, next)
    }
}

// ============================================================================
// Conditional
// ============================================================================

/// Applies a middleware only to contexts satisfying a matcher.
///
/// Contexts that do not match go straight to `next`.
#[derive(Clone)]
pub struct Conditional {
    condition: BoxedMatcher,
    middleware: BoxedMiddleware,
}

impl Conditional {
    /// Creates a conditional middleware.
    pub fn new<M: Middleware + 'static>(condition: impl IntoMatcher, middleware: M) -> Self {
        Self {
            condition: condition.into_matcher(),
            middleware: Arc::new(middleware),
        }
    }
}

impl Middleware for Conditional {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(ConditionalHandler {
            condition: self.condition.clone(),
            wrapped: self.middleware.wrap(next.clone()),
            next,
        })
    }
}

struct ConditionalHandler {
    condition: BoxedMatcher,
    wrapped: BoxedHandler,
    next: BoxedHandler,
}

impl Handler for ConditionalHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        if self.condition.matches(&ctx) {
            self.wrapped.call(ctx)
        } else {
            self.next.call(ctx)
        }
    }
}
