//! Handler abstraction.
//!
//! A [`Handler`] processes one [`MessageContext`] and reports success or a
//! [`HandlerError`]. Route handlers, and every layer a middleware wraps around
//! them, implement the same trait so they compose freely.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_core::{handler_fn, HandlerResult, MessageContext};
//!
//! let echo = handler_fn(|ctx: Arc<MessageContext>| async move {
//!     ctx.reply_text(ctx.text().to_string()).await?;
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::MessageContext;
use crate::error::HandlerResult;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core trait for message handlers.
pub trait Handler: Send + Sync + 'static {
    /// Processes the context.
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult>;
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn Handler>;

/// Adapts an async closure into a [`Handler`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new handler function wrapper.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Arc<MessageContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(ctx))
    }
}

/// Converts an async closure into a [`BoxedHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Arc<MessageContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(HandlerFn::new(f))
}

/// Boxes any handler.
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(handler)
}
