//! Request logging.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use beacon_core::{BoxFuture, BoxedHandler, Handler, HandlerResult, MessageContext};

use super::Middleware;

/// Logs the message kind, elapsed time and outcome of every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging;

impl Logging {
    /// Creates the logging middleware.
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Logging {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(LoggingHandler { next })
    }
}

struct LoggingHandler {
    next: BoxedHandler,
}

impl Handler for LoggingHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        let kind = ctx.variant().as_str();
        let sender = ctx.sender_id();
        debug!(kind, sender, "Processing message");

        let start = Instant::now();
        let fut = self.next.call(ctx);
        Box::pin(async move {
            let result = fut.await;
            let elapsed = start.elapsed();
            match &result {
                Ok(()) => debug!(kind, sender, ?elapsed, "Message processed"),
                Err(e) => warn!(kind, sender, ?elapsed, error = %e, "Message processing failed"),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::private_ctx;
    use super::*;
    use beacon_core::{HandlerError, handler_fn};

    #[tokio::test]
    async fn test_logging_is_transparent() {
        let ok = Logging.wrap(handler_fn(|_ctx| async { Ok(()) }));
        assert!(ok.call(private_ctx(1, "x")).await.is_ok());

        let failing = Logging.wrap(handler_fn(|_ctx| async {
            Err::<(), _>(HandlerError::msg("nope"))
        }));
        let err = failing.call(private_ctx(1, "x")).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
