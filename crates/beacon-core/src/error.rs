//! Unified error types for the Beacon core.
//!
//! Framework-level errors (bus, matcher compilation) live in `beacon-framework`;
//! the types here are the ones that cross the context and handler boundary.

use std::error::Error as StdError;

use thiserror::Error;

use crate::message::{GroupId, UserId, Variant};

/// A boxed, thread-safe error.
pub type BoxError = Box<dyn StdError + Send + Sync>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors surfaced by the messaging transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection is not available.
    #[error("transport is not connected")]
    NotConnected,

    /// The backend refused or failed to deliver the message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The operation is not supported for this message variant.
    #[error("operation '{operation}' is not supported for {variant} messages")]
    Unsupported {
        /// The attempted operation.
        operation: &'static str,
        /// The variant of the message the operation was attempted on.
        variant: Variant,
    },

    /// A group folder was created but could not be found afterwards.
    #[error("folder '{name}' not found in group {group_id}")]
    FolderNotFound {
        /// The group that was searched.
        group_id: GroupId,
        /// The folder name.
        name: String,
    },

    /// Backend-specific failure.
    #[error("transport error: {0}")]
    Other(String),
}

// =============================================================================
// Rejections
// =============================================================================

/// A middleware refused to let a call through.
///
/// Rejections short-circuit only their own chain; sibling routes still run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The sender exceeded the rate limit.
    #[error("requests too frequent, please try again later ({key})")]
    RateLimited {
        /// The rate-limit key that tripped.
        key: String,
    },

    /// The sender is not in the allowed set.
    #[error("user {user_id} is not authorized")]
    Unauthorized {
        /// The rejected sender.
        user_id: UserId,
    },

    /// The message arrived in the wrong kind of conversation.
    #[error("this command is only available in {required} chats")]
    WrongScope {
        /// The variant the command requires.
        required: Variant,
    },
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Errors returned by route handlers and middleware.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A middleware rejected the call.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// A transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handler panicked and the panic was caught.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// A plain error message.
    #[error("{0}")]
    Message(String),

    /// Any other error.
    #[error(transparent)]
    Other(BoxError),
}

impl HandlerError {
    /// Creates a plain message error.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Returns the rejection if this error is one.
    pub fn as_rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl From<BoxError> for HandlerError {
    fn from(err: BoxError) -> Self {
        match err.downcast::<HandlerError>() {
            Ok(inner) => *inner,
            Err(other) => Self::Other(other),
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type returned by handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
