//! Routes: a handler guarded by matchers and wrapped in local middleware.
//!
//! ```rust,ignore
//! use beacon_framework::{Route, matcher, middleware::GroupOnly};
//!
//! let route = Route::new("upload", upload_handler)
//!     .with_matcher(matcher::CommandMatcher::new("/", ["upload"]))
//!     .with_middleware(GroupOnly);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use beacon_core::{BoxedHandler, MessageContext};

use crate::matcher::{BoxedMatcher, IntoMatcher};
use crate::middleware::{self, BoxedMiddleware, Middleware};

/// A handler together with the matchers that select it and the middleware
/// that wraps it.
///
/// Matchers and middleware can still be added after the route is registered;
/// each dispatch works on a snapshot taken when it starts.
pub struct Route {
    name: String,
    handler: BoxedHandler,
    matchers: RwLock<Vec<BoxedMatcher>>,
    middleware: RwLock<Vec<BoxedMiddleware>>,
}

impl Route {
    /// Creates a route with no matchers, which matches everything.
    pub fn new(name: impl Into<String>, handler: BoxedHandler) -> Self {
        Self {
            name: name.into(),
            handler,
            matchers: RwLock::new(Vec::new()),
            middleware: RwLock::new(Vec::new()),
        }
    }

    /// Adds a matcher (builder pattern).
    pub fn with_matcher(self, matcher: impl IntoMatcher) -> Self {
        self.add_matcher(matcher);
        self
    }

    /// Adds a local middleware (builder pattern).
    pub fn with_middleware<M: Middleware + 'static>(self, middleware: M) -> Self {
        self.add_middleware(middleware);
        self
    }

    /// Adds a matcher.
    pub fn add_matcher(&self, matcher: impl IntoMatcher) {
        self.matchers.write().push(matcher.into_matcher());
    }

    /// Adds a local middleware. It runs inside every middleware added before it.
    pub fn add_middleware<M: Middleware + 'static>(&self, middleware: M) {
        self.middleware.write().push(Arc::new(middleware));
    }

    /// Adds an already boxed local middleware.
    pub fn add_boxed_middleware(&self, middleware: BoxedMiddleware) {
        self.middleware.write().push(middleware);
    }

    /// Returns the route name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the unwrapped handler.
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// Returns `true` if every matcher accepts `ctx`. Stops at the first miss.
    pub fn matches(&self, ctx: &MessageContext) -> bool {
        let matchers = self.matchers.read().clone();
        matchers.iter().all(|m| m.matches(ctx))
    }

    /// Returns a snapshot of the local middleware.
    pub fn middleware(&self) -> Vec<BoxedMiddleware> {
        self.middleware.read().clone()
    }

    /// Freezes the current matchers and middleware.
    ///
    /// Later additions to the route do not affect the returned snapshot.
    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            name: self.name.clone(),
            handler: self.handler.clone(),
            matchers: self.matchers.read().clone(),
            middleware: self.middleware.read().clone(),
        }
    }

    /// Returns the number of matchers.
    pub fn matcher_count(&self) -> usize {
        self.matchers.read().len()
    }
}

/// A route frozen at the start of a dispatch.
#[derive(Clone)]
pub struct RouteSnapshot {
    name: String,
    handler: BoxedHandler,
    matchers: Vec<BoxedMatcher>,
    middleware: Vec<BoxedMiddleware>,
}

impl RouteSnapshot {
    /// Returns the route name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if every matcher accepts `ctx`. Stops at the first miss.
    pub fn matches(&self, ctx: &MessageContext) -> bool {
        self.matchers.iter().all(|m| m.matches(ctx))
    }

    /// Wraps the handler in the frozen local middleware.
    pub fn handler(&self) -> BoxedHandler {
        middleware::apply(&self.middleware, self.handler.clone())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("matchers", &self.matchers.read().len())
            .field("middleware", &self.middleware.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{self, CommandMatcher};
    use crate::middleware::test_util::private_ctx;
    use beacon_core::handler_fn;

    fn noop() -> BoxedHandler {
        handler_fn(|_ctx| async { Ok(()) })
    }

    #[test]
    fn test_route_without_matchers_matches_all() {
        let route = Route::new("all", noop());
        assert_eq!(route.matcher_count(), 0);
        assert!(route.matches(&private_ctx(1, "")));
    }

    #[test]
    fn test_route_requires_every_matcher() {
        let route = Route::new("login", noop())
            .with_matcher(matcher::is_private())
            .with_matcher(CommandMatcher::new("/", ["login"]));

        assert!(route.matches(&private_ctx(1, "/login")));
        assert!(!route.matches(&private_ctx(1, "/help")));
    }

    #[test]
    fn test_matchers_added_after_construction() {
        let route = Route::new("late", noop());
        route.add_matcher(matcher::from_users([5]));
        assert!(!route.matches(&private_ctx(1, "x")));
        assert!(route.matches(&private_ctx(5, "x")));
    }

    #[test]
    fn test_snapshot_ignores_later_matchers() {
        let route = Route::new("frozen", noop());
        let snapshot = route.snapshot();
        route.add_matcher(matcher::is_group());

        assert_eq!(snapshot.name(), "frozen");
        assert!(snapshot.matches(&private_ctx(1, "x")));
        assert!(!route.matches(&private_ctx(1, "x")));
    }
}
