//! Sliding-window rate limiting per sender.
//!
//! ```text
//!            window
//!   ◀──────────────────────▶
//!   ──┬────┬─────────┬──────┼──▶ time
//!     │    │         │      now
//!   expired  kept   kept
//! ```
//!
//! Each key keeps the timestamps of its accepted calls. On every call the
//! timestamps older than the window are dropped; if `max_requests` remain the
//! call is rejected, otherwise it is recorded and passed on.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use beacon_core::{
    BoxFuture, BoxedHandler, Handler, HandlerError, HandlerResult, InboundMessage, MessageContext,
    Rejection,
};

use super::Middleware;

/// Returns the rate-limit key for a context.
///
/// Private senders are keyed by user, group and temporary-conversation
/// senders by group and user.
pub fn rate_limit_key(ctx: &MessageContext) -> String {
    match ctx.message() {
        InboundMessage::Private(msg) => format!("private_{}", msg.sender.user_id),
        InboundMessage::Group(msg) => format!("group_{}_{}", msg.group_id, msg.sender.user_id),
        InboundMessage::Temp(msg) => format!("temp_{}_{}", msg.group_id, msg.sender.user_id),
    }
}

#[derive(Debug)]
struct LimiterState {
    history: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl LimiterState {
    /// Drops keys whose newest call is older than the window.
    fn sweep(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.last_sweep) < window {
            return;
        }
        self.history.retain(|_, calls| {
            calls
                .back()
                .is_some_and(|last| now.duration_since(*last) < window)
        });
        self.last_sweep = now;
    }
}

/// Rejects senders that exceed `max_requests` calls per `window`.
///
/// State is shared by every handler this middleware wraps, so a sender's
/// budget covers all routes using the same instance.
#[derive(Debug, Clone)]
pub struct RateLimit {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimit {
    /// Creates a limiter allowing `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(LimiterState {
                history: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    /// Records a call for `key`, or returns `false` if the key is over its limit.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.sweep(now, self.window);

        let calls = state.history.entry(key.to_string()).or_default();
        while calls
            .front()
            .is_some_and(|first| now.duration_since(*first) >= self.window)
        {
            calls.pop_front();
        }

        if calls.len() >= self.max_requests {
            return false;
        }
        calls.push_back(now);
        true
    }

    /// Returns the number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state.lock().history.len()
    }
}

impl Middleware for RateLimit {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(RateLimitHandler {
            limiter: self.clone(),
            next,
        })
    }
}

struct RateLimitHandler {
    limiter: RateLimit,
    next: BoxedHandler,
}

impl Handler for RateLimitHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        let key = rate_limit_key(&ctx);
        if !self.limiter.check(&key) {
            debug!(key = %key, "Rate limit exceeded");
            let err = HandlerError::from(Rejection::RateLimited { key });
            return Box::pin(async move { Err(err) });
        }

        trace!(key = %key, "Rate limit passed");
        self.next.call(ctx)
    }
}
