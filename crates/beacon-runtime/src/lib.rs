//! Beacon Runtime - Orchestration layer for the Beacon dispatch core.
//!
//! This crate provides:
//! - Configuration loading (`ConfigLoader`, `BeaconConfig`)
//! - Logging configuration (`LoggingBuilder`)
//! - Runtime orchestration (`BeaconRuntime`): default middleware, the
//!   message pipeline and graceful shutdown
//!
//! ```ignore
//! use beacon_runtime::{BeaconRuntime, Inbound};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BeaconRuntime::new();
//!
//!     runtime.handle_command("ping", ping_handler);
//!
//!     // The transport pushes `Inbound` values into `tx`
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     spawn_transport(tx);
//!
//!     // Runs until Ctrl+C, then drains in-flight messages
//!     runtime.run(rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Cargo Features
//!
//! - `toml-config`: read `beacon.toml` / `config.toml`
//! - `yaml-config`: read `beacon.yaml` / `beacon.yml`
//! - `json-log`: enable `format = "json"` for log output

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{BeaconConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BeaconRuntime, Inbound, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
