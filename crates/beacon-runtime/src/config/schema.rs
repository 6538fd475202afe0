//! Configuration schema definitions.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [dispatch]
//! command_prefix = "/"
//!
//! [bus]
//! timeout_secs = 30
//!
//! [rate_limit]
//! enabled = true
//! max_requests = 5
//! window_secs = 10
//!
//! [auth]
//! enabled = true
//! allowed_users = [10001, 10002]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use beacon_core::UserId;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Router settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Event bus settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Global rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Global sender allow-list.
    #[serde(default)]
    pub auth: AuthConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Target file when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module level overrides, e.g. `beacon_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Router configuration.
///
/// Panic recovery is always installed and cannot be disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Prefix used by command routes.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Install the logging middleware.
    #[serde(default = "default_true")]
    pub logging: bool,

    /// Install the metrics middleware.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            logging: true,
            metrics: true,
        }
    }
}

fn default_command_prefix() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Bus
// =============================================================================

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-delivery timeout in seconds.
    #[serde(default = "default_bus_timeout_secs")]
    pub timeout_secs: u64,
}

impl BusConfig {
    /// Returns the delivery timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_bus_timeout_secs(),
        }
    }
}

fn default_bus_timeout_secs() -> u64 {
    30
}

// =============================================================================
// Rate limiting & auth
// =============================================================================

/// Global rate-limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Install the rate-limit middleware.
    #[serde(default)]
    pub enabled: bool,

    /// Calls allowed per window and sender.
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl RateLimitConfig {
    /// Returns the window length.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> usize {
    10
}

fn default_window_secs() -> u64 {
    60
}

/// Global authorization configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Install the authorization middleware.
    #[serde(default)]
    pub enabled: bool,

    /// Senders allowed through.
    #[serde(default)]
    pub allowed_users: Vec<UserId>,
}
