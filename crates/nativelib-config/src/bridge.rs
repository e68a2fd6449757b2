//! Bridge Configuration (nativelib.toml)
//!
//! Controls where the embedded library is materialized, which exports are
//! resolved, how calls into the module are gated, and where native log
//! records go.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default name of the computational export
pub const DEFAULT_COMPUTE_SYMBOL: &str = "factorial";

/// Default name of the optional log callback setter
pub const DEFAULT_LOG_CALLBACK_SYMBOL: &str = "set_log_callback";

/// Default prefix for extracted artifact file names
pub const DEFAULT_FILE_PREFIX: &str = "nativelib-";

/// Bridge configuration from nativelib.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Artifact extraction settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractConfig>,

    /// Exported symbol names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<SymbolsConfig>,

    /// Native call gating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calls: Option<CallsConfig>,

    /// Native log delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// What happens to the extracted artifact once the module is open
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Leave the file on disk for the rest of the process (and after it)
    Keep,
    /// Unlink the file as soon as the loader holds a mapping of it
    #[default]
    RemoveAfterLoad,
}

impl CleanupPolicy {
    /// Parse a policy from its config/env spelling
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "keep" => Some(CleanupPolicy::Keep),
            "remove-after-load" | "remove" => Some(CleanupPolicy::RemoveAfterLoad),
            _ => None,
        }
    }
}

/// Where decoded native log records are delivered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    /// Forward as `tracing` events
    #[default]
    Tracing,
    /// Print `[Level N] message` lines to stdout
    Stdout,
}

impl SinkKind {
    /// Parse a sink kind from its config/env spelling
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "tracing" => Some(SinkKind::Tracing),
            "stdout" => Some(SinkKind::Stdout),
            _ => None,
        }
    }
}

/// Extraction settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ExtractConfig {
    /// Directory the artifact is written to (default: system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Cleanup policy for the artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupPolicy>,

    /// File name prefix; a random component is always appended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_prefix: Option<String>,

    /// Read the artifact back and compare length and digest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
}

/// Exported symbol names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SymbolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_callback: Option<String>,
}

/// Native call gating
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CallsConfig {
    /// Serialize calls into the module (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serialize: Option<bool>,

    /// Deadline for a single native call in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Native log delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Register the log callback when the module exports the setter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkKind>,

    /// Show messages the module flagged as containing PII
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_pii: Option<bool>,
}

impl BridgeConfig {
    /// Load bridge configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::new(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(extract) = &self.extract {
            if let Some(dir) = &extract.scratch_dir {
                if dir.is_relative() {
                    return Err(ConfigError::InvalidValue {
                        field: "extract.scratch_dir".to_string(),
                        reason: format!("must be an absolute path, got '{}'", dir.display()),
                    });
                }
            }
            if let Some(prefix) = &extract.file_prefix {
                if prefix.contains('/') || prefix.contains('\\') {
                    return Err(ConfigError::InvalidValue {
                        field: "extract.file_prefix".to_string(),
                        reason: format!("must not contain path separators, got '{}'", prefix),
                    });
                }
            }
        }

        if let Some(symbols) = &self.symbols {
            validate_symbol_name("symbols.compute", symbols.compute.as_deref())?;
            validate_symbol_name("symbols.log_callback", symbols.log_callback.as_deref())?;
        }

        if let Some(CallsConfig {
            timeout_ms: Some(0),
            ..
        }) = &self.calls
        {
            return Err(ConfigError::InvalidValue {
                field: "calls.timeout_ms".to_string(),
                reason: "must be greater than zero; omit it to disable the deadline".to_string(),
            });
        }

        Ok(())
    }

    /// Merge another config into this one, section by section.
    /// Other config takes precedence for non-None values.
    pub fn merge(&mut self, other: &BridgeConfig) {
        if let Some(theirs) = &other.extract {
            let ours = self.extract.get_or_insert_with(Default::default);
            merge_opt(&mut ours.scratch_dir, &theirs.scratch_dir);
            merge_opt(&mut ours.cleanup, &theirs.cleanup);
            merge_opt(&mut ours.file_prefix, &theirs.file_prefix);
            merge_opt(&mut ours.verify, &theirs.verify);
        }
        if let Some(theirs) = &other.symbols {
            let ours = self.symbols.get_or_insert_with(Default::default);
            merge_opt(&mut ours.compute, &theirs.compute);
            merge_opt(&mut ours.log_callback, &theirs.log_callback);
        }
        if let Some(theirs) = &other.calls {
            let ours = self.calls.get_or_insert_with(Default::default);
            merge_opt(&mut ours.serialize, &theirs.serialize);
            merge_opt(&mut ours.timeout_ms, &theirs.timeout_ms);
        }
        if let Some(theirs) = &other.logging {
            let ours = self.logging.get_or_insert_with(Default::default);
            merge_opt(&mut ours.enabled, &theirs.enabled);
            merge_opt(&mut ours.sink, &theirs.sink);
            merge_opt(&mut ours.show_pii, &theirs.show_pii);
        }
    }

    /// Effective scratch directory
    pub fn scratch_dir(&self) -> PathBuf {
        self.extract
            .as_ref()
            .and_then(|e| e.scratch_dir.clone())
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn cleanup(&self) -> CleanupPolicy {
        self.extract
            .as_ref()
            .and_then(|e| e.cleanup)
            .unwrap_or_default()
    }

    pub fn file_prefix(&self) -> &str {
        self.extract
            .as_ref()
            .and_then(|e| e.file_prefix.as_deref())
            .unwrap_or(DEFAULT_FILE_PREFIX)
    }

    pub fn verify_artifact(&self) -> bool {
        self.extract.as_ref().and_then(|e| e.verify).unwrap_or(true)
    }

    pub fn compute_symbol(&self) -> &str {
        self.symbols
            .as_ref()
            .and_then(|s| s.compute.as_deref())
            .unwrap_or(DEFAULT_COMPUTE_SYMBOL)
    }

    pub fn log_callback_symbol(&self) -> &str {
        self.symbols
            .as_ref()
            .and_then(|s| s.log_callback.as_deref())
            .unwrap_or(DEFAULT_LOG_CALLBACK_SYMBOL)
    }

    pub fn serialize_calls(&self) -> bool {
        self.calls.as_ref().and_then(|c| c.serialize).unwrap_or(true)
    }

    /// Deadline for a single native call, if any
    pub fn call_timeout(&self) -> Option<Duration> {
        self.calls
            .as_ref()
            .and_then(|c| c.timeout_ms)
            .map(Duration::from_millis)
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.enabled).unwrap_or(true)
    }

    pub fn sink(&self) -> SinkKind {
        self.logging
            .as_ref()
            .and_then(|l| l.sink)
            .unwrap_or_default()
    }

    pub fn show_pii(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.show_pii)
            .unwrap_or(false)
    }
}

fn merge_opt<T: Clone>(ours: &mut Option<T>, theirs: &Option<T>) {
    if theirs.is_some() {
        *ours = theirs.clone();
    }
}

fn validate_symbol_name(field: &str, name: Option<&str>) -> ConfigResult<()> {
    match name {
        Some(name) if name.is_empty() || name.contains('\0') => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "symbol name must be non-empty and contain no NUL bytes".to_string(),
        }),
        _ => Ok(()),
    }
}
