//! Conversation scope restrictions.

use std::sync::Arc;

use beacon_core::{
    BoxFuture, BoxedHandler, Handler, HandlerError, HandlerResult, MessageContext, Rejection,
    Variant,
};

use super::Middleware;

/// Rejects every message that is not a group message.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupOnly;

/// Rejects every message that is not a private message.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivateOnly;

impl Middleware for GroupOnly {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(ScopeHandler {
            required: Variant::Group,
            next,
        })
    }
}

impl Middleware for PrivateOnly {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(ScopeHandler {
            required: Variant::Private,
            next,
        })
    }
}

struct ScopeHandler {
    required: Variant,
    next: BoxedHandler,
}

impl Handler for ScopeHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        if ctx.variant() != self.required {
            let err = HandlerError::from(Rejection::WrongScope {
                required: self.required,
            });
            return Box::pin(async move { Err(err) });
        }
        self.next.call(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::private_ctx;
    use super::*;
    use beacon_core::handler_fn;

    #[tokio::test]
    async fn test_scope_restrictions() {
        let ok = || handler_fn(|_ctx| async { Ok(()) });

        let err = GroupOnly
            .wrap(ok())
            .call(private_ctx(1, "x"))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_rejection(),
            Some(&Rejection::WrongScope {
                required: Variant::Group
            })
        );

        assert!(PrivateOnly.wrap(ok()).call(private_ctx(1, "x")).await.is_ok());
    }
}
