//! Configuration module for the Beacon runtime.
//!
//! Figment-based loading from defaults, config files and `BEACON_*`
//! environment variables, followed by validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, load_config, load_config_from_file};
pub use schema::{
    AuthConfig, BeaconConfig, BusConfig, DispatchConfig, LogFormat, LogLevel, LogOutput,
    LoggingConfig, RateLimitConfig, SpanEventConfig,
};
pub use validation::validate_config;
