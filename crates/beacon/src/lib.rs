//! # Beacon
//!
//! The message-dispatch core of a chat automation agent.
//!
//! ## Overview
//!
//! Every inbound message becomes a [`MessageContext`](core::MessageContext)
//! and is offered to every registered route. A route runs when all of its
//! matchers accept the context, wrapped by its own middleware and then the
//! router's global middleware. Lifecycle notifications go out on an
//! in-process event bus that is independent of the router.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌─────────────────────────────────────────────┐
//! │ Transport │────▶│ Runtime                                     │
//! └───────────┘     │   ├─▶ MessageStore (background)             │
//!       ▲           │   ├─▶ EventBus: message.received            │
//!       │           │   ├─▶ Router ─▶ route "a" (matchers ✓) ─▶ … │
//!       │  replies  │   │          ─▶ route "b" (matchers ✓) ─▶ … │
//!       └───────────│   └─▶ EventBus: message.processed           │
//!                   └─────────────────────────────────────────────┘
//! ```
//!
//! - **Core**: message model, context, handler trait, connection and store traits
//! - **Framework**: matchers, middleware, routes, the router and the event bus
//! - **Runtime**: configuration, logging and the delivery pipeline
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use beacon::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BeaconRuntime::new();
//!
//!     runtime.handle_command("echo", handler_fn(|ctx| async move {
//!         let args: Vec<String> = ctx.get(keys::ARGS).unwrap_or_default();
//!         ctx.reply_text(args.join(" ")).await?;
//!         Ok(())
//!     }));
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     my_transport::start(tx);
//!     runtime.run(rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use beacon_core as core;
pub use beacon_framework as framework;
pub use beacon_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use beacon::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use beacon_runtime::{BeaconConfig, BeaconRuntime, Inbound};

    // Context and handlers
    pub use beacon_core::{
        BoxedConnection, BoxedHandler, Connection, Handler, HandlerError, HandlerResult,
        InboundMessage, MessageContext, Rejection, Segment, Variant, handler_fn, keys,
    };

    // Matchers and routing
    pub use beacon_framework::matcher::{
        CommandMatcher, IntoMatcher, Matcher, RegexMatcher, TextMatcher, and, custom, from_users,
        in_groups, is_group, is_private, is_temp, not, or,
    };
    pub use beacon_framework::{Route, Router};

    // Middleware
    pub use beacon_framework::middleware::{
        Auth, Chain, Conditional, GroupOnly, LayerMiddleware, Logging, Metrics, Middleware,
        PrivateOnly, RateLimit, Recovery,
    };

    // Event bus
    pub use beacon_framework::{
        ErrorEvent, Event, EventBus, EventHandler, MessageEvent, event_handler_fn, topics,
    };
}
