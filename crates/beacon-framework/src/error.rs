//! Error types for the Beacon framework.

use std::time::Duration;

use thiserror::Error;

use beacon_core::BoxError;

/// A matcher pattern failed to compile.
///
/// Raised while building routes, never during dispatch.
#[derive(Debug, Error)]
#[error("invalid match pattern '{pattern}': {source}")]
pub struct MatchCompileError {
    /// The rejected pattern.
    pub pattern: String,
    /// The underlying regex error.
    #[source]
    pub source: regex::Error,
}

/// Errors reported by the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// A subscriber returned an error.
    #[error("subscriber for '{topic}' failed: {source}")]
    Subscriber {
        /// The topic being delivered.
        topic: String,
        /// The subscriber's error.
        #[source]
        source: BoxError,
    },

    /// A synchronous delivery did not finish in time.
    #[error("delivery of '{topic}' timed out after {timeout:?}")]
    Timeout {
        /// The topic being delivered.
        topic: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The bus has been closed.
    #[error("event bus is closed")]
    Closed,
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;
