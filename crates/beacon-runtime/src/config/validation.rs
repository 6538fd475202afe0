//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AuthConfig, BeaconConfig, BusConfig, LogOutput, LoggingConfig, RateLimitConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BeaconConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bus_config(&config.bus)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_auth_config(&config.auth)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

fn validate_bus_config(bus: &BusConfig) -> ConfigResult<()> {
    if bus.timeout_secs == 0 {
        return Err(ConfigError::validation(
            "bus.timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_rate_limit_config(rate_limit: &RateLimitConfig) -> ConfigResult<()> {
    if rate_limit.max_requests == 0 {
        return Err(ConfigError::validation(
            "rate_limit.max_requests must be greater than 0",
        ));
    }
    if rate_limit.window_secs == 0 {
        return Err(ConfigError::validation(
            "rate_limit.window_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_auth_config(auth: &AuthConfig) -> ConfigResult<()> {
    if auth.enabled && auth.allowed_users.is_empty() {
        return Err(ConfigError::validation(
            "auth.allowed_users must not be empty when auth is enabled",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BeaconConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = BeaconConfig::default();
        config.rate_limit.window_secs = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = BeaconConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_bus_timeout_rejected() {
        let mut config = BeaconConfig::default();
        config.bus.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_enabled_auth_needs_users() {
        let mut config = BeaconConfig::default();
        config.auth.enabled = true;
        assert!(validate_config(&config).is_err());

        config.auth.allowed_users = vec![1];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = BeaconConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}
