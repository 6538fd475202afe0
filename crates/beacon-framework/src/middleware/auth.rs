//! Sender authorization.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use beacon_core::{
    BoxFuture, BoxedHandler, Handler, HandlerError, HandlerResult, MessageContext, Rejection,
    UserId, keys,
};

use super::Middleware;

/// Rejects senders outside an allowed set.
///
/// On success writes [`keys::USER_ID`] (`UserId`) and [`keys::AUTHORIZED`]
/// (`true`) before calling `next`.
#[derive(Debug, Clone)]
pub struct Auth {
    allowed: Arc<HashSet<UserId>>,
}

impl Auth {
    /// Creates an authorization middleware for `allowed`.
    pub fn new(allowed: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            allowed: Arc::new(allowed.into_iter().collect()),
        }
    }

    /// Returns `true` if `user_id` is allowed.
    pub fn is_allowed(&self, user_id: UserId) -> bool {
        self.allowed.contains(&user_id)
    }
}

impl Middleware for Auth {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(AuthHandler {
            auth: self.clone(),
            next,
        })
    }
}

struct AuthHandler {
    auth: Auth,
    next: BoxedHandler,
}

impl Handler for AuthHandler {
    fn call(&self, ctx: Arc<MessageContext>) -> BoxFuture<'static, HandlerResult> {
        let user_id = ctx.sender_id();
        if !self.auth.is_allowed(user_id) {
            debug!(user_id, "Unauthorized sender");
            let err = HandlerError::from(Rejection::Unauthorized { user_id });
            return Box::pin(async move { Err(err) });
        }

        ctx.set(keys::USER_ID, user_id);
        ctx.set(keys::AUTHORIZED, true);
        self.next.call(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::private_ctx;
    use super::*;
    use beacon_core::handler_fn;

    #[tokio::test]
    async fn test_allowed_sender_is_annotated() {
        let handler = Auth::new([1]).wrap(handler_fn(|ctx: Arc<MessageContext>| async move {
            assert_eq!(ctx.get::<UserId>(keys::USER_ID), Some(1));
            assert_eq!(ctx.get::<bool>(keys::AUTHORIZED), Some(true));
            Ok(())
        }));

        handler.call(private_ctx(1, "x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_sender_is_rejected() {
        let handler = Auth::new([1]).wrap(handler_fn(|_ctx| async {
            Err::<(), _>(HandlerError::msg("next ran"))
        }));

        let ctx = private_ctx(2, "x");
        let err = handler.call(ctx.clone()).await.unwrap_err();
        assert_eq!(
            err.as_rejection(),
            Some(&Rejection::Unauthorized { user_id: 2 })
        );
        assert!(!ctx.contains(keys::AUTHORIZED));
    }
}
