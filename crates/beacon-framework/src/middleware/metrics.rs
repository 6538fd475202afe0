//! Processing metadata.

use std::sync::Arc;
use std::time::SystemTime;

use beacon_core::{BoxFuture, BoxedHandler, Handler, HandlerResult, MessageContext, keys};

use super::Middleware;

/// Annotates the context with processing metadata.
///
/// Before `next` runs, writes [`keys::MESSAGE_TYPE`] (`String`) and
/// [`keys::PROCESSED_AT`] (`SystemTime`). When `next` fails, writes the error
/// text under [`keys::PROCESSING_ERROR`] (`String`). The result is returned
/// unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics;

impl Metrics {
    /// Creates the metrics middleware.
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Metrics {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(MetricsHandler { next })
    }
}

struct MetricsHandler {
    next: BoxedHandler,
}

impl Handler for MetricsHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        let next = self.next.clone();
        Box::pin(async move {
            ctx.set(keys::MESSAGE_TYPE, ctx.variant().as_str().to_string());
            ctx.set(keys::PROCESSED_AT, SystemTime::now());

            let result = next.call(ctx.clone()).await;
            if let Err(e) = &result {
                ctx.set(keys::PROCESSING_ERROR, e.to_string());
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
    async fn test_metadata_written_before_next() {
        let handler = Metrics.wrap(handler_fn(|ctx: Arc<MessageContext>| async move {
            assert_eq!(ctx.get::<String>(keys::MESSAGE_TYPE).as_deref(), Some("private"));
            assert!(ctx.get::<SystemTime>(keys::PROCESSED_AT).is_some());
            Ok(())
        }));

        let ctx = private_ctx(1, "x");
        handler.call(ctx.clone()).await.unwrap();
        assert!(!ctx.contains(keys::PROCESSING_ERROR));
    }

    #[tokio::test]
    async fn test_error_recorded() {
        let handler = Metrics.wrap(handler_fn(|_ctx| async {
            Err::<(), _>(HandlerError::msg("db down"))
        }));

        let ctx = private_ctx(1, "x");
        assert!(handler.call(ctx.clone()).await.is_err());
        assert_eq!(ctx.get_string(keys::PROCESSING_ERROR), "db down");
    }
}
