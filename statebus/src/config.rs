//! Configuration management for statebus
//!
//! Values come from defaults, then `STATEBUS_*` environment variables, then a
//! `statebus.yaml` file. Later sources override earlier ones.

use crate::bus::{ContextFilterConfig, DEFAULT_FILTER_ENV};
use crate::dispatcher::DEFAULT_MAX_CHAIN_DEPTH;
use crate::env_loader::{load_env_optional, EnvLoader};
use crate::router::{RouterConfig, DEFAULT_TRANSPORT_DSN};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of every statebus environment variable
pub const ENV_PREFIX: &str = "STATEBUS";

/// Queue prefix variable kept for existing deployments
pub const LEGACY_QUEUE_PREFIX_ENV: &str = "STATEQUEUE_PREFIX";

/// File name searched for in the configuration locations
pub const CONFIG_FILE_NAME: &str = "statebus.yaml";

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Failed to read a configuration file from disk
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML content from a configuration file
    #[error("Invalid YAML syntax in {path}:\n{source}\n\nHint: Check for proper indentation and YAML formatting")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        field: String,
        value: String,
        hint: String,
    },
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Prepended to every generated queue address
    pub queue_prefix: String,
    /// Transport DSN the generated queues share
    pub async_transport_dsn: String,
    /// Directories compiled at boot
    pub workflow_paths: Vec<PathBuf>,
    /// Generate routes for async transitions at all
    pub enable_dynamic_routing: bool,
    /// Run every transition synchronously
    pub sync: bool,
    /// Send every async message to this transport instead
    pub forced_transport: Option<String>,
    pub max_chain_depth: usize,
    /// Variable holding the consumer's context allow-list
    pub context_filter_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_prefix: String::new(),
            async_transport_dsn: DEFAULT_TRANSPORT_DSN.to_string(),
            workflow_paths: vec![PathBuf::from("workflows")],
            enable_dynamic_routing: true,
            sync: false,
            forced_transport: None,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            context_filter_env: DEFAULT_FILTER_ENV.to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration instance with values loaded from:
    /// 1. YAML file (highest precedence)
    /// 2. Environment variables
    /// 3. Defaults (lowest precedence)
    ///
    /// An unreadable or invalid YAML file is logged and ignored.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env_vars();

        match YamlConfig::load_or_default() {
            Ok(yaml_config) => {
                yaml_config.apply_to_config(&mut config);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load YAML configuration, falling back to env vars and defaults: {}",
                    e
                );
            }
        }

        config
    }

    /// Like [`new`](Self::new), but reading the YAML file at `path` and
    /// failing on any problem with it
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_vars();
        YamlConfig::load_from_file(path)?.apply_to_config(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        let loader = EnvLoader::new(ENV_PREFIX);

        if let Some(prefix) = load_env_optional::<String>(LEGACY_QUEUE_PREFIX_ENV) {
            self.queue_prefix = prefix;
        }
        self.queue_prefix = loader.load_string("QUEUE_PREFIX", &self.queue_prefix);
        self.async_transport_dsn =
            loader.load_string("ASYNC_TRANSPORT_DSN", &self.async_transport_dsn);
        if let Some(paths) = loader.load_list("WORKFLOW_PATHS") {
            self.workflow_paths = paths.into_iter().map(PathBuf::from).collect();
        }
        self.enable_dynamic_routing =
            loader.load_parsed("ENABLE_DYNAMIC_ROUTING", self.enable_dynamic_routing);
        self.sync = loader.load_parsed("SYNC", self.sync);
        if let Some(transport) = loader.load_optional::<String>("FORCED_TRANSPORT") {
            self.forced_transport = Some(transport).filter(|t| !t.trim().is_empty());
        }
        self.max_chain_depth = loader.load_parsed("MAX_CHAIN_DEPTH", self.max_chain_depth);
        self.context_filter_env =
            loader.load_string("CONTEXT_FILTER_ENV", &self.context_filter_env);
    }

    /// Find the statebus.yaml configuration file
    ///
    /// The search order is:
    /// 1. Current working directory: `statebus.yaml`
    /// 2. `~/.config/statebus/statebus.yaml`
    /// 3. `~/statebus.yaml`
    pub fn find_yaml_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(home_dir) = dirs::home_dir() {
            search_paths.push(
                home_dir
                    .join(".config")
                    .join("statebus")
                    .join(CONFIG_FILE_NAME),
            );
            search_paths.push(home_dir.join(CONFIG_FILE_NAME));
        }

        let found = search_paths.into_iter().find(|path| path.is_file());
        match &found {
            Some(path) => tracing::debug!("Found configuration file: {:?}", path),
            None => tracing::debug!("No {} found in any search location", CONFIG_FILE_NAME),
        }
        found
    }

    /// Validate the current configuration settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chain_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_chain_depth".to_string(),
                value: "0".to_string(),
                hint: "max_chain_depth must allow at least one synchronous hop".to_string(),
            });
        }
        if self.async_transport_dsn.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "async_transport_dsn".to_string(),
                value: self.async_transport_dsn.clone(),
                hint: format!("use a DSN such as '{DEFAULT_TRANSPORT_DSN}'"),
            });
        }
        if self.context_filter_env.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "context_filter_env".to_string(),
                value: self.context_filter_env.clone(),
                hint: format!("name an environment variable, e.g. '{DEFAULT_FILTER_ENV}'"),
            });
        }
        Ok(())
    }

    /// Router settings derived from this configuration
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig::new(self.queue_prefix.clone(), self.async_transport_dsn.clone())
    }

    /// Read the consumer allow-list from the configured variable
    pub fn filter_config(&self) -> ContextFilterConfig {
        ContextFilterConfig::from_env(&self.context_filter_env)
    }
}

/// Configuration loaded from statebus.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    pub queue_prefix: Option<String>,
    pub async_transport_dsn: Option<String>,
    pub workflow_paths: Option<Vec<PathBuf>>,
    pub enable_dynamic_routing: Option<bool>,
    pub sync: Option<bool>,
    pub forced_transport: Option<String>,
    pub max_chain_depth: Option<usize>,
    pub context_filter_env: Option<String>,
}

impl YamlConfig {
    /// Apply YAML configuration values to an existing Config
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(prefix) = &self.queue_prefix {
            config.queue_prefix = prefix.clone();
        }
        if let Some(dsn) = &self.async_transport_dsn {
            config.async_transport_dsn = dsn.clone();
        }
        if let Some(paths) = &self.workflow_paths {
            config.workflow_paths = paths.clone();
        }
        if let Some(enabled) = self.enable_dynamic_routing {
            config.enable_dynamic_routing = enabled;
        }
        if let Some(sync) = self.sync {
            config.sync = sync;
        }
        if let Some(transport) = &self.forced_transport {
            config.forced_transport = Some(transport.clone()).filter(|t| !t.trim().is_empty());
        }
        if let Some(depth) = self.max_chain_depth {
            config.max_chain_depth = depth;
        }
        if let Some(name) = &self.context_filter_env {
            config.context_filter_env = name.clone();
        }
    }

    /// Load YAML configuration from a file path
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Loading YAML configuration from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        // An empty file deserializes to unit, not to a struct
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Try to load YAML configuration, returning default if file not found
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Config::find_yaml_config_file() {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}
