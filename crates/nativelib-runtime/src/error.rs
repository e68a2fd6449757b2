/// Bridge error types
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Coarse failure class, matching the bridge's error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Extraction,
    Load,
    SymbolNotFound,
    NativeCall,
    Config,
}

/// Failure signaled by (or while running) a native entry point
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeCallError {
    /// The module returned its failure sentinel (0). A legitimate result of
    /// zero is indistinguishable from this.
    #[error("native call failed for input {input}: returned failure sentinel 0")]
    FailureSentinel { input: i32 },

    #[error("native call for input {input} did not finish within {timeout:?}")]
    Timeout { input: i32, timeout: Duration },

    #[error("native call for input {input} panicked on the worker thread")]
    Panicked { input: i32 },

    #[error("worker running the native call for input {input} went away")]
    WorkerLost { input: i32 },
}

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("Failed to extract embedded library to {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error(
        "Extracted library at {path} does not match embedded bytes \
         ({actual_len} bytes, sha256 {actual_sha256}; expected {expected_len} bytes, sha256 {expected_sha256})"
    )]
    Integrity {
        path: PathBuf,
        expected_len: u64,
        actual_len: u64,
        expected_sha256: String,
        actual_sha256: String,
    },

    #[error("Failed to load library {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Symbol '{symbol}' not found in library {module}")]
    SymbolNotFound { symbol: String, module: PathBuf },

    #[error(transparent)]
    NativeCall(#[from] NativeCallError),

    #[error("Invalid bridge configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Create an extraction error with path context
    pub fn extraction(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Extraction {
            path: path.into(),
            source: Arc::new(error),
        }
    }

    /// Create a load error
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(symbol: impl Into<String>, module: impl Into<PathBuf>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
            module: module.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Extraction { .. } | BridgeError::Integrity { .. } => {
                ErrorKind::Extraction
            }
            BridgeError::Load { .. } => ErrorKind::Load,
            BridgeError::SymbolNotFound { .. } => ErrorKind::SymbolNotFound,
            BridgeError::NativeCall(_) => ErrorKind::NativeCall,
            BridgeError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<nativelib_config::ConfigError> for BridgeError {
    fn from(e: nativelib_config::ConfigError) -> Self {
        BridgeError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            BridgeError::extraction("/tmp/x", io).kind(),
            ErrorKind::Extraction
        );
        assert_eq!(BridgeError::load("/tmp/x", "bad elf").kind(), ErrorKind::Load);
        assert_eq!(
            BridgeError::symbol_not_found("factorial", "/tmp/x").kind(),
            ErrorKind::SymbolNotFound
        );
        assert_eq!(
            BridgeError::from(NativeCallError::FailureSentinel { input: 0 }).kind(),
            ErrorKind::NativeCall
        );
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::symbol_not_found("factorial", "/tmp/libx.so");
        assert!(err.to_string().contains("'factorial'"));
        assert!(err.to_string().contains("/tmp/libx.so"));

        let err = BridgeError::from(NativeCallError::FailureSentinel { input: 7 });
        assert!(err.to_string().contains("sentinel"));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_clone_preserves_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = BridgeError::extraction("/tmp/x", io);
        let copy = err.clone();

        assert_eq!(err.to_string(), copy.to_string());
        assert!(copy.source().is_some());
    }
}
