//! The router: evaluates every route against a context.
//!
//! # Dispatch
//!
//! 1. Snapshot the route list, every route's matchers and middleware, the
//!    global middleware and the error sink in one step
//! 2. For every route, in registration order, check its matchers; a miss
//!    skips the route before any middleware runs
//! 3. Wrap the handler with the route's middleware, then the global
//!    middleware (global outermost), and invoke it
//! 4. Hand any error to the error sink and continue with the next route
//!
//! ```text
//!             ┌──────────── global ────────────┐
//!   ctx ──▶   │  ┌───────── local ─────────┐   │
//!             │  │        handler          │   │   ──▶ error sink
//!             │  └─────────────────────────┘   │
//!             └────────────────────────────────┘
//! ```
//!
//! A failing route never prevents later routes from running, and there is no
//! "first match wins": every matching route runs.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{Instrument, Level, debug, error, span, trace};

use beacon_core::{BoxedHandler, HandlerError, MessageContext};

use crate::middleware::{self, BoxedMiddleware, Middleware};
use crate::route::{Route, RouteSnapshot};

/// Receives every error returned by a route.
pub type ErrorSink = Arc<dyn Fn(&HandlerError, &Arc<MessageContext>) + Send + Sync>;

fn log_error(err: &HandlerError, ctx: &Arc<MessageContext>) {
    error!(
        error = %err,
        kind = ctx.variant().as_str(),
        sender = ctx.sender_id(),
        "Route handler failed"
    );
}

struct RouterState {
    routes: Vec<Arc<Route>>,
    middleware: Vec<BoxedMiddleware>,
    error_sink: ErrorSink,
}

/// Ordered collection of routes plus global middleware.
pub struct Router {
    state: RwLock<RouterState>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router whose errors go to the log.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RouterState {
                routes: Vec::new(),
                middleware: Vec::new(),
                error_sink: Arc::new(log_error),
            }),
        }
    }

    /// Registers a route and returns a handle to it.
    pub fn add_route(&self, route: Route) -> Arc<Route> {
        let route = Arc::new(route);
        debug!(route = route.name(), "Registered route");
        self.state.write().routes.push(route.clone());
        route
    }

    /// Registers a handler with no matchers and returns its route.
    pub fn route(&self, name: impl Into<String>, handler: BoxedHandler) -> Arc<Route> {
        self.add_route(Route::new(name, handler))
    }

    /// Appends a global middleware.
    pub fn use_middleware<M: Middleware + 'static>(&self, middleware: M) {
        self.state.write().middleware.push(Arc::new(middleware));
    }

    /// Appends an already boxed global middleware.
    pub fn use_boxed_middleware(&self, middleware: BoxedMiddleware) {
        self.state.write().middleware.push(middleware);
    }

    /// Replaces the error sink.
    pub fn set_error_sink<F>(&self, sink: F)
    where
        F: Fn(&HandlerError, &Arc<MessageContext>) + Send + Sync + 'static,
    {
        self.state.write().error_sink = Arc::new(sink);
    }

    /// Returns the number of registered routes.
    pub fn route_count(&self) -> usize {
        self.state.read().routes.len()
    }

    /// Returns the number of global middleware.
    pub fn middleware_count(&self) -> usize {
        self.state.read().middleware.len()
    }

    /// Runs every matching route against `ctx`.
    ///
    /// Routes, matchers or middleware added while this call is running only
    /// take effect from the next dispatch. Returns the number of routes that
    /// matched.
    pub async fn handle(&self, ctx: Arc<MessageContext>) -> usize {
        let (routes, global, sink) = {
            let state = self.state.read();
            let routes: Vec<RouteSnapshot> =
                state.routes.iter().map(|route| route.snapshot()).collect();
            (routes, state.middleware.clone(), state.error_sink.clone())
        };

        let mut matched = 0;
        for route in &routes {
            if !route.matches(&ctx) {
                trace!(route = route.name(), "Route skipped");
                continue;
            }
            matched += 1;

            let handler = middleware::apply(&global, route.handler());

            let span = span!(Level::DEBUG, "route", route = route.name());
            if let Err(e) = handler.call(ctx.clone()).instrument(span).await {
                sink(&e, &ctx);
            }
        }

        matched
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_count())
            .field("middleware", &self.middleware_count())
            .finish_non_exhaustive()
    }
}
