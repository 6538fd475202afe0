//! In-process publish/subscribe event bus.
//!
//! # Delivery modes
//!
//! ```text
//! publish(event)                      publish_sync(event).await
//!   │                                   │
//!   ├─▶ spawn ─▶ subscriber 1           ├─▶ subscriber 1 ─▶ subscriber 2 ─▶ ...
//!   ├─▶ spawn ─▶ subscriber 2           │   (one timeout for the whole batch,
//!   └─▶ spawn ─▶ subscriber n           │    first error stops the batch)
//!   (returns immediately)               └─▶ Result
//! ```
//!
//! Asynchronous deliveries run on tracked tasks, each isolated against
//! panics and under a soft timeout: when it expires the subscriber's
//! cancellation token fires and its outcome is ignored, but the task keeps
//! running until the subscriber returns. [`EventBus::close`] cancels every
//! token and waits for all tracked tasks, including ones spawned by a
//! `publish` that raced with it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{BusError, BusResult};
use crate::event::{BoxedEventHandler, Event, EventHandler};
use crate::middleware::recovery::panic_message;

/// Default per-delivery timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    topic: String,
    id: u64,
}

impl Subscription {
    /// Returns the subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Topic-based publish/subscribe bus.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<(u64, BoxedEventHandler)>>>,
    next_id: AtomicU64,
    timeout: Duration,
    cancel: CancellationToken,
    tracker: TaskTracker,
    // Held shared while publishing and exclusively while closing, so no
    // delivery is spawned after `close` starts waiting.
    lifecycle: RwLock<()>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a bus with a custom delivery timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            lifecycle: RwLock::new(()),
        }
    }

    /// Returns the delivery timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // ─── Subscriptions ────────────────────────────────────────────────────────

    /// Appends a subscriber to `topic`.
    pub fn subscribe<H: EventHandler>(&self, topic: impl Into<String>, handler: H) -> Subscription {
        self.subscribe_boxed(topic, Arc::new(handler))
    }

    /// Appends an already boxed subscriber to `topic`.
    pub fn subscribe_boxed(
        &self,
        topic: impl Into<String>,
        handler: BoxedEventHandler,
    ) -> Subscription {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(topic.clone())
            .or_default()
            .push((id, handler));
        debug!(topic = %topic, id, "Subscribed");
        Subscription { topic, id }
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(list) = subscribers.get_mut(&subscription.topic) else {
            return false;
        };

        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(&subscription.topic);
        }
        if removed {
            debug!(topic = %subscription.topic, id = subscription.id, "Unsubscribed");
        }
        removed
    }

    /// Returns the number of subscribers of `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.read().get(topic).map_or(0, Vec::len)
    }

    /// Returns every topic with at least one subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscribers.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    fn snapshot(&self, topic: &str) -> Vec<BoxedEventHandler> {
        self.subscribers
            .read()
            .get(topic)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    // ─── Publishing ───────────────────────────────────────────────────────────

    /// Delivers `event` to every subscriber on its own task.
    ///
    /// Never blocks and never reports subscriber failures to the caller.
    /// Must be called from within a tokio runtime. Events published after
    /// [`close`](Self::close) are dropped.
    pub fn publish(&self, event: Event) {
        let subscribers = self.snapshot(event.topic());
        if subscribers.is_empty() {
            return;
        }
        let _open = self.lifecycle.read();
        if self.cancel.is_cancelled() {
            warn!(topic = event.topic(), "Event bus closed, dropping event");
            return;
        }

        debug!(
            topic = event.topic(),
            subscribers = subscribers.len(),
            "Publishing event"
        );
        let event = Arc::new(event);
        for subscriber in subscribers {
            let event = event.clone();
            let token = self.cancel.child_token();
            let timeout = self.timeout;
            self.tracker
                .spawn(deliver(subscriber, event, token, timeout));
        }
    }

    /// Delivers `event` to every subscriber in order, on the calling task.
    ///
    /// Stops at the first subscriber error and returns it. The whole batch
    /// shares one timeout; when it expires the shared token is cancelled and
    /// [`BusError::Timeout`] is returned.
    pub async fn publish_sync(&self, event: Event) -> BusResult<()> {
        let subscribers = self.snapshot(event.topic());
        if subscribers.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(BusError::Closed);
        }

        let topic = event.topic().to_string();
        debug!(topic = %topic, subscribers = subscribers.len(), "Publishing event synchronously");

        let event = Arc::new(event);
        let token = self.cancel.child_token();
        let batch = async {
            for subscriber in &subscribers {
                if let Err(source) = subscriber.handle(event.clone(), token.clone()).await {
                    error!(topic = %topic, error = %source, "Subscriber failed");
                    return Err(BusError::Subscriber {
                        topic: topic.clone(),
                        source,
                    });
                }
            }
            Ok(())
        };

        let outcome = tokio::time::timeout(self.timeout, batch).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                warn!(topic = %topic, timeout = ?self.timeout, "Synchronous delivery timed out");
                Err(BusError::Timeout {
                    topic,
                    timeout: self.timeout,
                })
            }
        }
    }

    // ─── Shutdown ─────────────────────────────────────────────────────────────

    /// Cancels every in-flight delivery and waits until all of them returned.
    pub async fn close(&self) {
        {
            let _closing = self.lifecycle.write();
            self.cancel.cancel();
            self.tracker.close();
        }
        self.tracker.wait().await;
        info!("Event bus closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.topics())
            .field("timeout", &self.timeout)
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

/// Runs one asynchronous delivery.
async fn deliver(
    subscriber: BoxedEventHandler,
    event: Arc<Event>,
    token: CancellationToken,
    timeout: Duration,
) {
    let topic = event.topic().to_string();

    let body = match panic::catch_unwind(AssertUnwindSafe(|| {
        subscriber.handle(event, token.clone())
    })) {
        Ok(fut) => fut,
        Err(payload) => {
            error!(topic = %topic, panic = %panic_message(payload.as_ref()), "Subscriber panicked");
            return;
        }
    };
    let mut body = AssertUnwindSafe(body).catch_unwind();

    let outcome = tokio::select! {
        outcome = &mut body => Some(outcome),
        _ = tokio::time::sleep(timeout) => None,
    };

    match outcome {
        Some(Ok(Ok(()))) => {}
        Some(Ok(Err(e))) => error!(topic = %topic, error = %e, "Subscriber failed"),
        Some(Err(payload)) => {
            error!(topic = %topic, panic = %panic_message(payload.as_ref()), "Subscriber panicked")
        }
        None => {
            warn!(topic = %topic, ?timeout, "Subscriber timed out, cancelling");
            token.cancel();
            // The result of a timed-out delivery is ignored.
            let _ = body.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::mpsc;

    use super::*;
    use crate::event::event_handler_fn;
    use beacon_core::BoxError;

    fn counter_handler(counter: Arc<AtomicUsize>) -> impl EventHandler {
        event_handler_fn(move |_event, _cancel| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_close_waits_for_racing_publishes() {
        let bus = Arc::new(EventBus::new());
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let (on_start, on_finish) = (started.clone(), finished.clone());
        bus.subscribe(
            "t",
            event_handler_fn(move |_event, _cancel| {
                let (on_start, on_finish) = (on_start.clone(), on_finish.clone());
                async move {
                    on_start.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    on_finish.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    while !bus.is_closed() {
                        bus.publish(Event::new("t", ()));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.close().await;
        let done = finished.load(Ordering::SeqCst);

        for publisher in publishers {
            publisher.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(started.load(Ordering::SeqCst), done);
        assert_eq!(finished.load(Ordering::SeqCst), done);
    }

    #[tokio::test]
    async fn test_publish_sync_stops_at_first_error() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            "t",
            event_handler_fn(|_event, _cancel| async { Err::<(), BoxError>("first failed".into()) }),
        );
        bus.subscribe("t", counter_handler(counter.clone()));

        let err = bus.publish_sync(Event::new("t", ())).await.unwrap_err();
        assert!(matches!(err, BusError::Subscriber { ref topic, .. } if topic == "t"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_sync_runs_all_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.subscribe(
                "t",
                event_handler_fn(move |_event, _cancel| {
                    let order = order.clone();
                    async move {
                        order.lock().push(i);
                        Ok(())
                    }
                }),
            );
        }

        bus.publish_sync(Event::new("t", ())).await.unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_sync_shared_timeout() {
        let bus = EventBus::with_timeout(Duration::from_millis(50));
        bus.subscribe(
            "t",
            event_handler_fn(|_event, _cancel| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }),
        );

        let err = bus.publish_sync(Event::new("t", ())).await.unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(Event::new("nobody", ()));
        assert!(bus.publish_sync(Event::new("nobody", ())).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_does_not_wait_for_slow_subscriber() {
        let bus = EventBus::with_timeout(Duration::from_millis(100));
        let (fast_tx, mut fast_rx) = mpsc::unbounded_channel();
        let (slow_tx, mut slow_rx) = mpsc::unbounded_channel();

        bus.subscribe(
            "t",
            event_handler_fn(move |_event, cancel: CancellationToken| {
                let slow_tx = slow_tx.clone();
                async move {
                    tokio::select! {
                        _ = cancel.cancelled() => { let _ = slow_tx.send("cancelled"); }
                        _ = tokio::time::sleep(Duration::from_secs(60)) => { let _ = slow_tx.send("finished"); }
                    }
                    Ok(())
                }
            }),
        );
        bus.subscribe(
            "t",
            event_handler_fn(move |_event, _cancel| {
                let fast_tx = fast_tx.clone();
                async move {
                    let _ = fast_tx.send(());
                    Ok(())
                }
            }),
        );

        bus.publish(Event::new("t", ()));

        tokio::time::timeout(Duration::from_secs(5), fast_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(slow_rx.try_recv().is_err());

        bus.close().await;
        assert_eq!(slow_rx.recv().await, Some("cancelled"));
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            "t",
            event_handler_fn(|_event, _cancel| async {
                if true {
                    panic!("subscriber exploded");
                }
                Ok(())
            }),
        );
        bus.subscribe("t", counter_handler(counter.clone()));

        bus.publish(Event::new("t", ()));
        bus.close().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_deliveries() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let done = counter.clone();
        bus.subscribe(
            "t",
            event_handler_fn(move |_event, _cancel| {
                let done = done.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        bus.publish(Event::new("t", ()));
        bus.close().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_sync_publish() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe("t", counter_handler(counter.clone()));

        bus.close().await;
        bus.publish(Event::new("t", ()));
        assert!(matches!(
            bus.publish_sync(Event::new("t", ())).await,
            Err(BusError::Closed)
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let a = bus.subscribe("a", counter_handler(counter.clone()));
        let b = bus.subscribe("a", counter_handler(counter.clone()));
        bus.subscribe("b", counter_handler(counter.clone()));
        assert_eq!(bus.subscriber_count("a"), 2);
        assert_eq!(bus.topics(), vec!["a", "b"]);

        assert!(bus.unsubscribe(&a));
        assert!(!bus.unsubscribe(&a));
        assert_eq!(bus.subscriber_count("a"), 1);

        assert!(bus.unsubscribe(&b));
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.topics(), vec!["b"]);
    }
}
