//! Native library bridge
//!
//! Ships a native shared library inside the host binary and makes its
//! exports callable as ordinary Rust functions:
//! - Embedding the per-platform library bytes at build time (`blob`)
//! - Writing them to a uniquely named scratch file (`extract`)
//! - Loading the file and resolving its exports (`ffi`)
//! - Forwarding the library's log records to the host (`logging`)
//! - Doing all of the above exactly once per process (`facade`)
//!
//! ```rust,ignore
//! use nativelib_runtime::{embedded_library, EmbeddedBlob, NativeFacade};
//! use std::sync::OnceLock;
//!
//! static NATIVE: EmbeddedBlob = embedded_library!(
//!     "TestNativeLibrary",
//!     all(target_os = "linux", target_arch = "x86_64") => "../native/libTestNativeLibrary.so",
//! );
//! static FACADE: OnceLock<NativeFacade> = OnceLock::new();
//!
//! let value = FACADE.get_or_init(|| NativeFacade::new(NATIVE)).compute(5)?;
//! assert_eq!(value, 120);
//! ```

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod blob;
pub mod error;
pub mod extract;
pub mod facade;
pub mod ffi;
pub mod logging;

pub use blob::EmbeddedBlob;
pub use error::{BridgeError, BridgeResult, ErrorKind, NativeCallError};
pub use extract::{ExtractedArtifact, ResourceExtractor};
pub use facade::{interpret_return, FacadeState, NativeFacade};
pub use ffi::{
    CallbackBridge, CallbackError, CallbackTrampoline, DynamicLoader, ModuleLoader, NativeModule,
    SymbolAddress, SymbolResolver,
};
pub use logging::{
    sink_from_config, CollectingSink, LogEvent, LogLevel, LogSink, StdoutSink, TracingSink,
};
pub use nativelib_config::{BridgeConfig, CleanupPolicy, ConfigLoader};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
