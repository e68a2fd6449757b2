//! nativelib Configuration System
//!
//! Provides configuration for the native library bridge:
//! - Bridge configuration (`nativelib.toml`)
//! - Global user configuration (`~/.nativelib/config.toml`)
//! - Environment variable overrides (`NATIVELIB_*`)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.nativelib/config.toml)
//! 3. Project config (./nativelib.toml)
//! 4. Environment variables (NATIVELIB_*)
//!
//! # Example
//!
//! ```no_run
//! use nativelib_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("scratch dir: {}", config.scratch_dir().display());
//! ```

pub mod bridge;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use bridge::{
    BridgeConfig, CallsConfig, CleanupPolicy, ExtractConfig, LoggingConfig, SinkKind,
    SymbolsConfig, DEFAULT_COMPUTE_SYMBOL, DEFAULT_FILE_PREFIX, DEFAULT_LOG_CALLBACK_SYMBOL,
};
pub use loader::ConfigLoader;
