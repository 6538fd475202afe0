//! Events carried by the [`EventBus`](crate::bus::EventBus).
//!
//! An [`Event`] is a topic string, a type-erased payload and a timestamp.
//! Lifecycle topics published by the runtime are listed in [`topics`]; their
//! payloads are [`MessageEvent`] and [`ErrorEvent`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use beacon_core::{BoxError, BoxFuture, MessageContext, keys};

/// Well-known lifecycle topics.
pub mod topics {
    /// A message arrived, before routing.
    pub const MESSAGE_RECEIVED: &str = "message.received";
    /// A message went through the router.
    pub const MESSAGE_PROCESSED: &str = "message.processed";
    /// A command route completed.
    pub const COMMAND_EXECUTED: &str = "command.executed";
    /// A user joined a group.
    pub const USER_JOINED: &str = "user.joined";
    /// A user left a group.
    pub const USER_LEFT: &str = "user.left";
    /// A route returned an error.
    pub const ERROR_OCCURRED: &str = "error.occurred";
}

/// A published event.
#[derive(Clone)]
pub struct Event {
    topic: String,
    payload: Arc<dyn Any + Send + Sync>,
    timestamp: SystemTime,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new<T: Send + Sync + 'static>(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            payload: Arc::new(payload),
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a `message.received` event.
    pub fn message_received(ctx: Arc<MessageContext>) -> Self {
        Self::new(topics::MESSAGE_RECEIVED, MessageEvent { context: ctx })
    }

    /// Creates a `message.processed` event.
    pub fn message_processed(ctx: Arc<MessageContext>) -> Self {
        Self::new(topics::MESSAGE_PROCESSED, MessageEvent { context: ctx })
    }

    /// Creates a `command.executed` event and records the command on the
    /// context under [`keys::EXECUTED_COMMAND`].
    pub fn command_executed(ctx: Arc<MessageContext>, command: impl Into<String>) -> Self {
        ctx.set(keys::EXECUTED_COMMAND, command.into());
        Self::new(topics::COMMAND_EXECUTED, MessageEvent { context: ctx })
    }

    /// Creates an `error.occurred` event.
    pub fn error_occurred(error: impl fmt::Display, ctx: Arc<MessageContext>) -> Self {
        Self::new(
            topics::ERROR_OCCURRED,
            ErrorEvent {
                error: error.to_string(),
                context: ctx,
            },
        )
    }

    /// Returns the topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the payload if it has type `T`.
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Returns when the event was created.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("topic", &self.topic)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Payload of the message lifecycle topics.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// The context of the message.
    pub context: Arc<MessageContext>,
}

/// Payload of `error.occurred`.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The rendered error.
    pub error: String,
    /// The context the error occurred in.
    pub context: Arc<MessageContext>,
}

// ============================================================================
// Subscribers
// ============================================================================

/// Result type returned by subscribers.
pub type SubscriberResult = Result<(), BoxError>;

/// A bus subscriber.
///
/// The token is cancelled when the bus closes or the delivery times out.
/// Long-running subscribers should watch it.
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one event.
    fn handle(
        &self,
        event: Arc<Event>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, SubscriberResult>;
}

/// A shared, type-erased subscriber.
pub type BoxedEventHandler = Arc<dyn EventHandler>;

/// Adapts an async closure into an [`EventHandler`].
#[derive(Clone)]
pub struct EventHandlerFn<F> {
    f: F,
}

impl<F, Fut> EventHandler for EventHandlerFn<F>
where
    F: Fn(Arc<Event>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SubscriberResult> + Send + 'static,
{
    fn handle(
        &self,
        event: Arc<Event>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, SubscriberResult> {
        Box::pin((self.f)(event, cancel))
    }
}

/// Wraps an async closure as a subscriber.
pub fn event_handler_fn<F, Fut>(f: F) -> EventHandlerFn<F>
where
    F: Fn(Arc<Event>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SubscriberResult> + Send + 'static,
{
    EventHandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_util::private_ctx;

    #[test]
    fn test_payload_downcast() {
        let event = Event::new("custom", 42_u32);
        assert_eq!(event.topic(), "custom");
        assert_eq!(event.payload::<u32>(), Some(&42));
        assert!(event.payload::<String>().is_none());
    }

    #[test]
    fn test_command_executed_records_command() {
        let ctx = private_ctx(1, "/help");
        let event = Event::command_executed(ctx.clone(), "help");

        assert_eq!(event.topic(), topics::COMMAND_EXECUTED);
        assert_eq!(ctx.get_string(keys::EXECUTED_COMMAND), "help");
        let payload = event.payload::<MessageEvent>().unwrap();
        assert!(Arc::ptr_eq(&payload.context, &ctx));
    }

    #[test]
    fn test_error_event_payload() {
        let event = Event::error_occurred("disk full", private_ctx(1, ""));
        assert_eq!(event.topic(), topics::ERROR_OCCURRED);
        assert_eq!(event.payload::<ErrorEvent>().unwrap().error, "disk full");
    }
}
