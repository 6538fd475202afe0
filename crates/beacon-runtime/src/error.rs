//! Runtime error types.

use thiserror::Error;

use beacon_framework::{BusError, MatchCompileError};

use crate::config::ConfigError;

/// Errors that can occur while building or running a [`BeaconRuntime`](crate::BeaconRuntime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A matcher pattern failed to compile.
    #[error(transparent)]
    Matcher(#[from] MatchCompileError),

    /// An event bus operation failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// A shutdown signal handler could not be installed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
