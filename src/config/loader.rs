//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, later sources overriding earlier ones:
//!
//! 1. `<dir>/podgroup.{toml,yaml,json}` (optional)
//! 2. `<dir>/podgroup.<environment>.{toml,yaml,json}` (optional)
//! 3. `PODGROUP__SECTION__FIELD` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::ControllerConfig;
use crate::constants::CONFIG_ENV_PREFIX;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "podgroup";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated controller configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ControllerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let base = config_directory.join(BASE_FILE_STEM);
        let overrides = config_directory.join(format!("{BASE_FILE_STEM}.{environment}"));

        let builder = Config::builder()
            .add_source(File::with_name(&base.to_string_lossy()).required(false))
            .add_source(File::with_name(&overrides.to_string_lossy()).required(false))
            .add_source(Self::environment_source(None));

        let config = Self::finish(builder, &config_directory.display().to_string())?;
        Ok(Self::log_loaded(config, environment, config_directory))
    }

    /// Load a single explicit configuration file plus environment overrides.
    /// Unlike directory loading, the file must exist.
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let builder = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(Self::environment_source(None));

        let config = Self::finish(builder, &path.display().to_string())?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::log_loaded(
            config,
            &Self::detect_environment(),
            directory,
        ))
    }

    /// Wrap an already-built configuration (tests, embedded use)
    pub fn from_config(config: ControllerConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the runtime environment from environment variables
    pub fn detect_environment() -> String {
        env::var("PODGROUP_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("PODGROUP_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    /// Environment variable source; `vars` replaces the process environment when given
    fn environment_source(vars: Option<config::Map<String, String>>) -> Environment {
        Environment::with_prefix(CONFIG_ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(vars)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        source_name: &str,
    ) -> ConfigResult<ControllerConfig> {
        let config: ControllerConfig = builder
            .build()
            .and_then(|built| built.try_deserialize::<ControllerConfig>())
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;

        config.validate()?;
        Ok(config)
    }

    fn log_loaded(
        config: ControllerConfig,
        environment: &str,
        config_directory: PathBuf,
    ) -> Arc<ConfigManager> {
        info!(
            environment = %environment,
            group_label = %config.labels.group_label,
            ready_label = %config.labels.ready_label,
            target_phase = %config.labels.target_phase,
            workers = config.driver.workers,
            "Configuration loaded successfully"
        );

        Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        })
    }
}
