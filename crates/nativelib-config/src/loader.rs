//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::bridge::{BridgeConfig, CleanupPolicy, SinkKind};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "nativelib.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.nativelib/config.toml) - lowest priority
/// 2. Project config (./nativelib.toml) - overrides global
/// 3. Environment variables (NATIVELIB_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from an explicit path
    pub fn with_global_config(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find nativelib.toml, merges it over the
    /// global config if one exists, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<BridgeConfig> {
        let mut config = self.load_global_config()?;

        if let Some(project) = Self::find_project_config(start_dir)? {
            config.merge(&project);
        }

        let config = Self::apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<BridgeConfig> {
        let mut config = self.load_global_config()?;
        config.merge(&BridgeConfig::load_from_file(config_path)?);

        let config = Self::apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(start_dir: &Path) -> ConfigResult<Option<BridgeConfig>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                return BridgeConfig::load_from_file(&config_path).map(Some);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok(None),
            }
        }
    }

    /// Load global configuration from ~/.nativelib/config.toml
    fn load_global_config(&mut self) -> ConfigResult<BridgeConfig> {
        if self.global_config_path.is_none() {
            match Self::global_config_dir() {
                Ok(dir) => self.global_config_path = Some(dir.join("config.toml")),
                // No home directory means no global config, not an error
                Err(ConfigError::HomeNotFound) => return Ok(BridgeConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match &self.global_config_path {
            Some(path) if path.exists() => BridgeConfig::load_from_file(path),
            _ => Ok(BridgeConfig::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables follow the pattern: NATIVELIB_<KEY>
    /// Example: NATIVELIB_CLEANUP=keep
    fn apply_env_overrides(mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if let Ok(dir) = env::var("NATIVELIB_SCRATCH_DIR") {
            config
                .extract
                .get_or_insert_with(Default::default)
                .scratch_dir = Some(PathBuf::from(dir));
        }

        if let Ok(cleanup) = env::var("NATIVELIB_CLEANUP") {
            let policy =
                CleanupPolicy::parse(&cleanup).ok_or_else(|| ConfigError::InvalidValue {
                    field: "NATIVELIB_CLEANUP".to_string(),
                    reason: format!("must be 'keep' or 'remove-after-load', got '{}'", cleanup),
                })?;
            config.extract.get_or_insert_with(Default::default).cleanup = Some(policy);
        }

        if let Ok(timeout) = env::var("NATIVELIB_CALL_TIMEOUT_MS") {
            let millis = timeout
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "NATIVELIB_CALL_TIMEOUT_MS".to_string(),
                    reason: e.to_string(),
                })?;
            config.calls.get_or_insert_with(Default::default).timeout_ms = Some(millis);
        }

        if let Ok(serialize) = env::var("NATIVELIB_SERIALIZE_CALLS") {
            config.calls.get_or_insert_with(Default::default).serialize = Some(parse_flag(&serialize));
        }

        if let Ok(sink) = env::var("NATIVELIB_LOG_SINK") {
            let kind = SinkKind::parse(&sink).ok_or_else(|| ConfigError::InvalidValue {
                field: "NATIVELIB_LOG_SINK".to_string(),
                reason: format!("must be 'tracing' or 'stdout', got '{}'", sink),
            })?;
            config.logging.get_or_insert_with(Default::default).sink = Some(kind);
        }

        if let Ok(enabled) = env::var("NATIVELIB_LOGGING") {
            config.logging.get_or_insert_with(Default::default).enabled = Some(parse_flag(&enabled));
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.nativelib)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".nativelib"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
