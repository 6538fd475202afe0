//! The Beacon runtime: wires transport delivery, persistence, the router and
//! the event bus together.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use beacon_runtime::BeaconRuntime;
//!
//! // Auto-loads beacon.toml from the current directory
//! let runtime = BeaconRuntime::new();
//!
//! runtime.handle_command("ping", handler_fn(|ctx| async move {
//!     ctx.reply_text("pong").await?;
//!     Ok(())
//! }));
//!
//! // `inbound` is the receiving half of the transport's channel
//! runtime.run(inbound).await?;
//! ```
//!
//! # Delivery
//!
//! ```text
//! Inbound ──▶ store (detached) ──▶ message.received ──▶ Router ──▶ message.processed
//!                                                          │
//!                                                          └─ errors ──▶ error.occurred
//! ```
//!
//! Each inbound message is dispatched on its own task. Routes within one
//! dispatch run sequentially.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use beacon_core::{
    BoxFuture, BoxedConnection, BoxedHandler, Handler, HandlerResult, InboundMessage,
    MessageContext, MessageStore,
};
use beacon_framework::matcher::{CommandMatcher, is_group, is_private, is_temp};
use beacon_framework::middleware::{Auth, Logging, Metrics, RateLimit, Recovery};
use beacon_framework::{Event, EventBus, EventHandler, Route, Router, Subscription};

use crate::config::{BeaconConfig, ConfigLoader};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// A message handed to the runtime by a transport.
pub struct Inbound {
    /// The connection the message arrived on, used for replies.
    pub connection: BoxedConnection,
    /// The message itself.
    pub message: InboundMessage,
}

impl Inbound {
    /// Creates an inbound delivery.
    pub fn new(connection: BoxedConnection, message: InboundMessage) -> Self {
        Self {
            connection,
            message,
        }
    }
}

/// Everything a dispatch task needs, cheap to clone into each task.
#[derive(Clone)]
struct Pipeline {
    router: Arc<Router>,
    bus: Arc<EventBus>,
    store: Option<Arc<dyn MessageStore>>,
    tasks: TaskTracker,
}

impl Pipeline {
    async fn deliver(&self, connection: BoxedConnection, message: InboundMessage) -> usize {
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let message = message.clone();
            self.tasks.spawn(async move {
                if let Err(e) = store.store(&message).await {
                    warn!(message_id = message.id(), error = %e, "Failed to store message");
                }
            });
        }

        let ctx = Arc::new(MessageContext::new(connection, message));
        self.bus.publish(Event::message_received(Arc::clone(&ctx)));

        let matched = self.router.handle(Arc::clone(&ctx)).await;
        debug!(
            kind = ctx.variant().as_str(),
            sender = ctx.sender_id(),
            matched,
            "Message dispatched"
        );

        self.bus.publish(Event::message_processed(ctx));
        matched
    }
}

/// Runs the wrapped handler and publishes `command.executed` when it succeeds.
struct CommandHandler {
    command: String,
    inner: BoxedHandler,
    bus: Arc<EventBus>,
}

impl Handler for CommandHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        let command = self.command.clone();
        let inner = Arc::clone(&self.inner);
        let bus = Arc::clone(&self.bus);
        Box::pin(async move {
            inner.call(Arc::clone(&ctx)).await?;
            bus.publish(Event::command_executed(ctx, command));
            Ok(())
        })
    }
}

/// The Beacon runtime.
///
/// # Custom Configuration
///
/// ```rust,ignore
/// let runtime = BeaconRuntime::builder()
///     .config_file("config/production.toml")
///     .build()?
///     .with_store(Arc::new(MemoryStore::new()));
/// ```
pub struct BeaconRuntime {
    config: BeaconConfig,
    pipeline: Pipeline,
    shutdown: CancellationToken,
}

impl BeaconRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Falls back to defaults if the configuration cannot be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                BeaconConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration.
    ///
    /// Initializes logging, then installs the global middleware in this
    /// order: `Recovery` (always), `Logging`, `Metrics`, `RateLimit`, `Auth`.
    pub fn from_config(config: &BeaconConfig) -> Self {
        logging::init_from_config(&config.logging);

        let router = Arc::new(Router::new());
        let bus = Arc::new(EventBus::with_timeout(config.bus.timeout()));

        router.use_middleware(Recovery::new());
        if config.dispatch.logging {
            router.use_middleware(Logging::new());
        }
        if config.dispatch.metrics {
            router.use_middleware(Metrics::new());
        }
        if config.rate_limit.enabled {
            router.use_middleware(RateLimit::new(
                config.rate_limit.max_requests,
                config.rate_limit.window(),
            ));
        }
        if config.auth.enabled {
            router.use_middleware(Auth::new(config.auth.allowed_users.iter().copied()));
        }

        let sink_bus = Arc::clone(&bus);
        router.set_error_sink(move |err, ctx| {
            if err.as_rejection().is_some() {
                debug!(error = %err, sender = ctx.sender_id(), "Message rejected");
            } else {
                error!(
                    error = %err,
                    kind = ctx.variant().as_str(),
                    sender = ctx.sender_id(),
                    "Route handler failed"
                );
            }
            sink_bus.publish(Event::error_occurred(err, Arc::clone(ctx)));
        });

        info!(
            log_level = %config.logging.level,
            command_prefix = %config.dispatch.command_prefix,
            middleware = router.middleware_count(),
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            pipeline: Pipeline {
                router,
                bus,
                store: None,
                tasks: TaskTracker::new(),
            },
            shutdown: CancellationToken::new(),
        }
    }

    /// Attaches a message store. Every delivered message is stored in the
    /// background; failures are logged and never block dispatch.
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.pipeline.store = Some(store);
        self
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    /// Returns the router.
    pub fn router(&self) -> &Arc<Router> {
        &self.pipeline.router
    }

    /// Returns the event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.pipeline.bus
    }

    /// Returns the attached store, if any.
    pub fn store(&self) -> Option<&Arc<dyn MessageStore>> {
        self.pipeline.store.as_ref()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a route that only sees private messages.
    pub fn handle_private(&self, name: impl Into<String>, handler: BoxedHandler) -> Arc<Route> {
        self.router()
            .add_route(Route::new(name, handler).with_matcher(is_private()))
    }

    /// Registers a route that only sees group messages.
    pub fn handle_group(&self, name: impl Into<String>, handler: BoxedHandler) -> Arc<Route> {
        self.router()
            .add_route(Route::new(name, handler).with_matcher(is_group()))
    }

    /// Registers a route that only sees temporary-conversation messages.
    pub fn handle_temp(&self, name: impl Into<String>, handler: BoxedHandler) -> Arc<Route> {
        self.router()
            .add_route(Route::new(name, handler).with_matcher(is_temp()))
    }

    /// Registers a command route using the configured prefix.
    ///
    /// The route is named `command:<command>`. When the handler succeeds,
    /// `command.executed` is published and the command is recorded on the
    /// context under `executed_command`.
    pub fn handle_command(&self, command: &str, handler: BoxedHandler) -> Arc<Route> {
        let matcher = CommandMatcher::new(self.config.dispatch.command_prefix.as_str(), [command]);
        let handler: BoxedHandler = Arc::new(CommandHandler {
            command: command.to_string(),
            inner: handler,
            bus: Arc::clone(self.bus()),
        });
        self.router()
            .add_route(Route::new(format!("command:{command}"), handler).with_matcher(matcher))
    }

    /// Subscribes to a bus topic.
    pub fn subscribe<H: EventHandler>(&self, topic: impl Into<String>, handler: H) -> Subscription {
        self.bus().subscribe(topic, handler)
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Delivers one message and waits for every matching route to finish.
    ///
    /// Returns the number of routes that matched.
    pub async fn deliver(&self, connection: BoxedConnection, message: InboundMessage) -> usize {
        self.pipeline.deliver(connection, message).await
    }

    /// Dispatches one message on a tracked background task.
    pub fn dispatch(&self, inbound: Inbound) {
        let pipeline = self.pipeline.clone();
        self.pipeline.tasks.spawn(async move {
            pipeline.deliver(inbound.connection, inbound.message).await;
        });
    }

    /// Dispatches messages from `inbound` until the channel closes or a
    /// shutdown signal (Ctrl+C or SIGTERM) arrives, then closes the runtime.
    pub async fn run(&self, inbound: mpsc::Receiver<Inbound>) -> RuntimeResult<()> {
        info!("Beacon runtime is now running. Press Ctrl+C to stop.");
        self.serve(inbound, wait_for_shutdown()).await
    }

    /// Like [`run`](Self::run), but stops when `shutdown` completes instead
    /// of on a signal.
    pub async fn run_until<F>(&self, inbound: mpsc::Receiver<Inbound>, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.serve(inbound, async {
            shutdown.await;
            Ok(())
        })
        .await
    }

    /// Makes a running [`run`](Self::run) loop stop accepting messages.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn serve<F>(&self, mut inbound: mpsc::Receiver<Inbound>, signal: F) -> RuntimeResult<()>
    where
        F: Future<Output = RuntimeResult<()>>,
    {
        tokio::pin!(signal);

        let outcome = loop {
            tokio::select! {
                result = &mut signal => break result,
                _ = self.shutdown.cancelled() => break Ok(()),
                next = inbound.recv() => match next {
                    Some(message) => self.dispatch(message),
                    None => {
                        info!("Inbound channel closed");
                        break Ok(());
                    }
                },
            }
        };

        self.close().await;
        outcome
    }

    /// Waits for in-flight dispatches and store writes, then closes the bus.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.pipeline.tasks.close();
        debug!(in_flight = self.pipeline.tasks.len(), "Waiting for dispatch tasks");
        self.pipeline.tasks.wait().await;
        self.pipeline.bus.close().await;
        info!("Runtime stopped");
    }
}

impl Default for BeaconRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`BeaconRuntime`] with custom configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: BeaconConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<BeaconRuntime> {
        let config = self.config_loader.load()?;
        Ok(BeaconRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use beacon_core::{
        DetachedConnection, GroupMessage, HandlerError, MemoryConnection, MemoryStore,
        PrivateMessage, Segment, Sender, handler_fn, keys,
    };
    use beacon_framework::{ErrorEvent, MessageEvent, event_handler_fn, topics};

    fn private(user_id: i64, text: &str) -> InboundMessage {
        PrivateMessage {
            id: 7,
            time: 0,
            sender: Sender::new(user_id),
            elements: vec![Segment::text(text)],
        }
        .into()
    }

    fn group(group_id: i64, user_id: i64, text: &str) -> InboundMessage {
        GroupMessage {
            id: 8,
            time: 0,
            group_id,
            group_name: String::new(),
            sender: Sender::new(user_id),
            elements: vec![Segment::text(text)],
        }
        .into()
    }

    fn detached() -> BoxedConnection {
        Arc::new(DetachedConnection)
    }

    fn quiet_config() -> BeaconConfig {
        let mut config = BeaconConfig::default();
        config.dispatch.logging = false;
        config
    }

    fn counter_handler(counter: Arc<AtomicUsize>) -> BoxedHandler {
        handler_fn(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    /// Forwards every event on `topic` into a channel.
    fn forward(runtime: &BeaconRuntime, topic: &str) -> mpsc::UnboundedReceiver<Arc<Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.subscribe(
            topic,
            event_handler_fn(move |event, _cancel| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event);
                    Ok(())
                }
            }),
        );
        rx
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Arc<Event>>) -> Arc<Event> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event not published in time")
            .expect("bus dropped")
    }

    #[tokio::test]
    async fn test_default_middleware_from_config() {
        let runtime = BeaconRuntime::from_config(&BeaconConfig::default());
        assert_eq!(runtime.router().middleware_count(), 3);

        let mut config = BeaconConfig::default();
        config.dispatch.logging = false;
        config.dispatch.metrics = false;
        let runtime = BeaconRuntime::from_config(&config);
        assert_eq!(runtime.router().middleware_count(), 1);

        let mut config = BeaconConfig::default();
        config.rate_limit.enabled = true;
        config.auth.enabled = true;
        config.auth.allowed_users = vec![1];
        let runtime = BeaconRuntime::from_config(&config);
        assert_eq!(runtime.router().middleware_count(), 5);
        assert_eq!(runtime.bus().timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_variant_routes() {
        let runtime = BeaconRuntime::from_config(&quiet_config());
        let private_hits = Arc::new(AtomicUsize::new(0));
        let group_hits = Arc::new(AtomicUsize::new(0));
        runtime.handle_private("private", counter_handler(private_hits.clone()));
        runtime.handle_group("group", counter_handler(group_hits.clone()));

        assert_eq!(runtime.deliver(detached(), private(1, "hi")).await, 1);
        assert_eq!(runtime.deliver(detached(), group(100, 1, "hi")).await, 1);
        assert_eq!(runtime.deliver(detached(), group(100, 2, "hi")).await, 1);

        assert_eq!(private_hits.load(Ordering::SeqCst), 1);
        assert_eq!(group_hits.load(Ordering::SeqCst), 2);
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_command_replies_and_publishes() {
        let runtime = BeaconRuntime::from_config(&quiet_config());
        let mut executed = forward(&runtime, topics::COMMAND_EXECUTED);

        runtime.handle_command(
            "echo",
            handler_fn(|ctx| async move {
                let args: Vec<String> = ctx.get(keys::ARGS).unwrap_or_default();
                ctx.reply_text(args.join(" ")).await?;
                Ok(())
            }),
        );

        let connection = Arc::new(MemoryConnection::new());
        let matched = runtime
            .deliver(connection.clone(), private(42, "/echo hello world"))
            .await;
        assert_eq!(matched, 1);

        let sent = connection.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].elements, vec![Segment::text("hello world")]);

        let event = next_event(&mut executed).await;
        let payload = event.payload::<MessageEvent>().unwrap();
        assert_eq!(payload.context.get_string(keys::EXECUTED_COMMAND), "echo");

        assert_eq!(runtime.deliver(detached(), private(42, "/other")).await, 0);
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_failed_command_is_not_published() {
        let runtime = BeaconRuntime::from_config(&quiet_config());
        let executed = Arc::new(AtomicUsize::new(0));
        let seen = executed.clone();
        runtime.subscribe(
            topics::COMMAND_EXECUTED,
            event_handler_fn(move |_event, _cancel| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        runtime.handle_command(
            "fail",
            handler_fn(|_ctx| async { Err(HandlerError::msg("nope")) }),
        );

        runtime.deliver(detached(), private(1, "/fail")).await;
        runtime.close().await;
        assert_eq!(executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_errors_are_published() {
        let runtime = BeaconRuntime::from_config(&quiet_config());
        let mut errors = forward(&runtime, topics::ERROR_OCCURRED);
        runtime.router().route(
            "broken",
            handler_fn(|_ctx| async { Err(HandlerError::msg("boom")) }),
        );

        runtime.deliver(detached(), private(1, "anything")).await;

        let event = next_event(&mut errors).await;
        let payload = event.payload::<ErrorEvent>().unwrap();
        assert!(payload.error.contains("boom"));
        assert_eq!(payload.context.sender_id(), 1);
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_panics_are_recovered() {
        async fn explode(_ctx: Arc<MessageContext>) -> HandlerResult {
            panic!("handler exploded");
        }

        let runtime = BeaconRuntime::from_config(&quiet_config());
        let mut errors = forward(&runtime, topics::ERROR_OCCURRED);
        let after = Arc::new(AtomicUsize::new(0));
        runtime.router().route("explode", handler_fn(explode));
        runtime.router().route("after", counter_handler(after.clone()));

        assert_eq!(runtime.deliver(detached(), private(1, "x")).await, 2);
        assert_eq!(after.load(Ordering::SeqCst), 1);

        let event = next_event(&mut errors).await;
        let payload = event.payload::<ErrorEvent>().unwrap();
        assert!(payload.error.contains("handler exploded"));
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let runtime = BeaconRuntime::from_config(&quiet_config());
        let mut received = forward(&runtime, topics::MESSAGE_RECEIVED);
        let mut processed = forward(&runtime, topics::MESSAGE_PROCESSED);

        runtime.deliver(detached(), private(5, "hello")).await;

        let event = next_event(&mut received).await;
        assert_eq!(event.payload::<MessageEvent>().unwrap().context.text(), "hello");
        let event = next_event(&mut processed).await;
        assert_eq!(event.payload::<MessageEvent>().unwrap().context.sender_id(), 5);
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_messages_are_stored() {
        let store = Arc::new(MemoryStore::new());
        let runtime = BeaconRuntime::from_config(&quiet_config()).with_store(store.clone());

        runtime.deliver(detached(), private(1, "keep me")).await;
        runtime.close().await;

        assert_eq!(store.len(), 1);
        let stored = store.load(7).await.unwrap().unwrap();
        assert_eq!(stored.sender().user_id, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_from_config() {
        let mut config = quiet_config();
        config.rate_limit.enabled = true;
        config.rate_limit.max_requests = 2;
        config.rate_limit.window_secs = 60;

        let runtime = BeaconRuntime::from_config(&config);
        let hits = Arc::new(AtomicUsize::new(0));
        runtime.router().route("count", counter_handler(hits.clone()));

        for _ in 0..3 {
            runtime.deliver(detached(), private(9, "spam")).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_auth_from_config() {
        let mut config = quiet_config();
        config.auth.enabled = true;
        config.auth.allowed_users = vec![1];

        let runtime = BeaconRuntime::from_config(&config);
        let hits = Arc::new(AtomicUsize::new(0));
        runtime.router().route("count", counter_handler(hits.clone()));

        runtime.deliver(detached(), private(1, "ok")).await;
        runtime.deliver(detached(), private(2, "denied")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_run_until_channel_closes() {
        let runtime = BeaconRuntime::from_config(&quiet_config());
        let hits = Arc::new(AtomicUsize::new(0));
        runtime.router().route("count", counter_handler(hits.clone()));

        let (tx, rx) = mpsc::channel(8);
        for i in 0..3 {
            tx.send(Inbound::new(detached(), private(i, "hi"))).await.unwrap();
        }
        drop(tx);

        runtime
            .run_until(rx, std::future::pending())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(runtime.bus().is_closed());
    }

    #[tokio::test]
    async fn test_run_until_shutdown_future() {
        let runtime = BeaconRuntime::from_config(&quiet_config());
        let (_tx, rx) = mpsc::channel::<Inbound>(1);

        runtime.run_until(rx, async {}).await.unwrap();
        assert!(runtime.bus().is_closed());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = BeaconConfig::default();
        config.bus.timeout_secs = 0;

        let result = BeaconRuntime::builder()
            .search_path(std::env::temp_dir().join("beacon-runtime-no-config"))
            .without_env()
            .merge(config)
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}
