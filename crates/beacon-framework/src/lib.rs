//! # Beacon Framework
//!
//! Dispatch components built on top of `beacon-core`.
//!
//! This layer provides:
//! - [`matcher`]: predicates selecting which routes apply to a message
//! - [`middleware`]: handler wrappers (recovery, logging, rate limiting, ...)
//! - [`Route`] and [`Router`]: ordered, run-every-match dispatch
//! - [`EventBus`]: topic-based publish/subscribe with tracked async delivery
//!
//! ```text
//!                       ┌──────────────── Router ────────────────┐
//! Arc<MessageContext> ─▶│ route 1: matchers ─▶ middleware ─▶ h1  │
//!                       │ route 2: matchers ─▶ middleware ─▶ h2  │──▶ error sink
//!                       │ ...                                    │
//!                       └────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod error;
pub mod event;
pub mod matcher;
pub mod middleware;
pub mod route;
pub mod router;

pub use bus::{DEFAULT_TIMEOUT, EventBus, Subscription};
pub use error::{BusError, BusResult, MatchCompileError};
pub use event::{
    BoxedEventHandler, ErrorEvent, Event, EventHandler, EventHandlerFn, MessageEvent,
    SubscriberResult, event_handler_fn, topics,
};
pub use matcher::{BoxedMatcher, IntoMatcher, Matcher};
pub use middleware::{BoxedMiddleware, Middleware};
pub use route::{Route, RouteSnapshot};
pub use router::{ErrorSink, Router};
