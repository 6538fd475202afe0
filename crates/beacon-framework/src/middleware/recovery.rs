//! Panic recovery.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use tracing::error;

use beacon_core::{BoxFuture, BoxedHandler, Handler, HandlerError, HandlerResult, MessageContext};

use super::Middleware;

/// Converts panics in the wrapped handler into [`HandlerError::Panicked`].
///
/// Both panics raised while creating the future and panics raised while
/// polling it are caught. The panic never reaches the router.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recovery;

impl Recovery {
    /// Creates the recovery middleware.
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Recovery {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(RecoveryHandler { next })
    }
}

struct RecoveryHandler {
    next: BoxedHandler,
}

impl Handler for RecoveryHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        let variant = ctx.variant();
        let fut = match panic::catch_unwind(AssertUnwindSafe(|| self.next.call(ctx))) {
            Ok(fut) => fut,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%variant, panic = %message, "Recovered from handler panic");
                return Box::pin(async move { Err(HandlerError::Panicked(message)) });
            }
        };

        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%variant, panic = %message, "Recovered from handler panic");
                    Err(HandlerError::Panicked(message))
                }
            }
        })
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::private_ctx;
    use super::*;

    struct PanicsOnCall;

    impl Handler for PanicsOnCall {
        fn call(&self, _ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
            panic!("boom on call");
        }
    }

    async fn panics_on_poll(_ctx: Arc<MessageContext>) -> HandlerResult {
        panic!("boom on poll")
    }

    #[tokio::test]
    async fn test_recovers_panic_while_polling() {
        let handler = Recovery.wrap(beacon_core::handler_fn(panics_on_poll));

        let err = handler.call(private_ctx(1, "x")).await.unwrap_err();
        match err {
            HandlerError::Panicked(message) => assert_eq!(message, "boom on poll"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_recovers_panic_while_building_future() {
        let handler = Recovery.wrap(Arc::new(PanicsOnCall));

        let err = handler.call(private_ctx(1, "x")).await.unwrap_err();
        assert!(matches!(err, HandlerError::Panicked(m) if m == "boom on call"));
    }

    #[tokio::test]
    async fn test_passes_through_results() {
        let handler = Recovery.wrap(beacon_core::handler_fn(|_ctx| async {
            Err::<(), _>(HandlerError::msg("plain failure"))
        }));

        let err = handler.call(private_ctx(1, "x")).await.unwrap_err();
        assert_eq!(err.to_string(), "plain failure");
    }

    #[test]
    fn test_recovers_outside_a_runtime() {
        let handler = Recovery.wrap(beacon_core::handler_fn(panics_on_poll));
        let err = tokio_test::block_on(handler.call(private_ctx(1, "x"))).unwrap_err();
        assert!(matches!(err, HandlerError::Panicked(_)));
    }

    #[test]
    fn test_panic_message_formats() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
