//! Interop with the tower ecosystem.
//!
//! ```text
//!  BoxedHandler ──HandlerService──▶ tower::Service ──Layer──▶ tower::Service
//!                                                                  │
//!  BoxedHandler ◀──────────────────ServiceHandler──────────────────┘
//! ```
//!
//! [`LayerMiddleware`] runs that round trip so any `tower::Layer` whose
//! service accepts `Arc<MessageContext>` can sit in a middleware list.
//! Service errors are converted with `Into<HandlerError>`; boxed errors that
//! wrap a [`HandlerError`] are unwrapped back to it.

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Service, ServiceExt};
use tower_layer::Layer;

use beacon_core::{BoxFuture, BoxedHandler, Handler, HandlerError, HandlerResult, MessageContext};

use super::Middleware;

/// A [`BoxedHandler`] exposed as a tower [`Service`].
#[derive(Clone)]
pub struct HandlerService(BoxedHandler);

impl HandlerService {
    /// Wraps `handler`.
    pub fn new(handler: BoxedHandler) -> Self {
        Self(handler)
    }
}

impl Service<Arc<MessageContext>> for HandlerService {
    type Response = ();
    type Error = HandlerError;
    type Future = BoxFuture<'static, HandlerResult>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<MessageContext>) -> Self::Future {
        self.0.call(ctx)
    }
}

/// A tower [`Service`] exposed as a [`Handler`].
///
/// Each call drives a fresh clone of the service to readiness.
#[derive(Clone)]
pub struct ServiceHandler<S> {
    svc: S,
}

impl<S> ServiceHandler<S> {
    /// Wraps `svc`.
    pub fn new(svc: S) -> Self {
        Self { svc }
    }
}

impl<S> Handler for ServiceHandler<S>
where
    S: Service<Arc<MessageContext>, Response = ()> + Clone + Send + Sync + 'static,
    S::Error: Into<HandlerError>,
    S::Future: Send + 'static,
{
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        let svc = self.svc.clone();
        Box::pin(async move { svc.oneshot(ctx).await.map_err(Into::into) })
    }
}

/// Uses a tower [`Layer`] as middleware.
#[derive(Clone)]
pub struct LayerMiddleware<L> {
    layer: L,
}

impl<L> LayerMiddleware<L> {
    /// Wraps `layer`.
    pub fn new(layer: L) -> Self {
        Self { layer }
    }
}

impl<L> Middleware for LayerMiddleware<L>
where
    L: Layer<HandlerService> + Send + Sync,
    L::Service: Service<Arc<MessageContext>, Response = ()> + Clone + Send + Sync + 'static,
    <L::Service as Service<Arc<MessageContext>>>::Error: Into<HandlerError>,
    <L::Service as Service<Arc<MessageContext>>>::Future: Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(ServiceHandler::new(
            self.layer.layer(HandlerService::new(next)),
        ))
    }
}
