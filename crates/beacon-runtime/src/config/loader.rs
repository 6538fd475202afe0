//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config`: enables TOML configuration files (`beacon.toml`, `config.toml`)
//! - `yaml-config`: enables YAML configuration files (`beacon.yaml`, `beacon.yml`, ...)
//!
//! Both features can be enabled simultaneously; if so, both file formats are searched.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Config file (`beacon.toml` / `beacon.yaml`)
//! 3. Environment variables (`BEACON_*`)
//! 4. Programmatic values passed to [`ConfigLoader::merge`]
//!
//! A merged [`BeaconConfig`] is a complete value, so every field it carries
//! wins over the file and the environment.
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `BEACON_` prefix with `__` as separator:
//!
//! - `BEACON_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `BEACON_BUS__TIMEOUT_SECS=60` → `bus.timeout_secs = 60`
//! - `BEACON_RATE_LIMIT__ENABLED=true` → `rate_limit.enabled = true`
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./config/beacon.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BeaconConfig;
use super::validation::validate_config;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "BEACON_";

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("beacon"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    ///
    /// Applied after the file and the environment.
    pub fn merge(mut self, config: BeaconConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<BeaconConfig> {
        let figment = self.build_figment()?;
        let config: BeaconConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            logging_level = %config.logging.level,
            bus_timeout_secs = config.bus.timeout_secs,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BeaconConfig::default()));
        let overrides = std::mem::take(&mut self.figment);

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(overrides))
    }

    /// Merges a single config file, dispatching on its extension.
    ///
    /// Only extensions enabled via feature flags are accepted.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("beacon"));
        }
        paths
    }

    /// Returns the first existing file among `search_paths × base_names`.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn find_file(search_paths: &[PathBuf], base_names: &[&str]) -> Option<PathBuf> {
        search_paths
            .iter()
            .flat_map(|dir| base_names.iter().map(move |name| dir.join(name)))
            .find(|path| path.exists())
    }

    /// Searches for and loads configuration files from search paths.
    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_mut, unused_variables)
    )]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        if let Some(path) = Self::find_file(&search_paths, &["beacon.toml", "config.toml"]) {
            info!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(path));
            found = true;
        }

        #[cfg(feature = "yaml-config")]
        if let Some(path) = Self::find_file(
            &search_paths,
            &["beacon.yaml", "beacon.yml", "config.yaml", "config.yml"],
        ) {
            info!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Yaml::file(path));
            found = true;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<BeaconConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from a specific file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<BeaconConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
