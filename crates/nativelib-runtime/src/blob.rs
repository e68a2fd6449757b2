//! Embedded library bytes
//!
//! The host program bundles exactly one native library per supported
//! platform. Selection happens at build time through `cfg` predicates; at
//! runtime the blob is just an immutable byte slice plus a name.

use sha2::{Digest, Sha256};

/// Native library bytes bundled into the host program
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedBlob {
    name: &'static str,
    bytes: &'static [u8],
}

impl EmbeddedBlob {
    /// Wrap embedded bytes under a logical library name (e.g. `"TestNativeLibrary"`)
    pub const fn new(name: &'static str, bytes: &'static [u8]) -> Self {
        Self { name, bytes }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name suffix the current platform's loader expects
    ///
    /// - Linux: .so
    /// - macOS: .dylib
    /// - Windows: .dll
    pub fn platform_suffix(&self) -> &'static str {
        std::env::consts::DLL_SUFFIX
    }

    /// Conventional file name for this library on the current platform
    /// (`libTestNativeLibrary.so`, `TestNativeLibrary.dll`, ...)
    pub fn platform_file_name(&self) -> String {
        format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            self.name,
            std::env::consts::DLL_SUFFIX
        )
    }

    /// Hex-encoded SHA-256 of the embedded bytes
    pub fn sha256_hex(&self) -> String {
        sha256_hex(self.bytes)
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Select one embedded library per target at build time.
///
/// Each arm pairs a `cfg` predicate with a path for `include_bytes!`. Only the
/// arm matching the compilation target is embedded; building for a target no
/// arm covers is a compile error.
///
/// ```rust,ignore
/// static NATIVE: nativelib_runtime::EmbeddedBlob = nativelib_runtime::embedded_library!(
///     "TestNativeLibrary",
///     all(target_os = "macos", target_arch = "aarch64") => "../native/libTestNativeLibrary.dylib",
///     all(target_os = "windows", target_arch = "x86_64") => "../native/TestNativeLibrary.dll",
///     all(target_os = "linux", target_arch = "x86_64") => "../native/libTestNativeLibrary.so",
/// );
/// ```
#[macro_export]
macro_rules! embedded_library {
    ($name:literal, $($platform:meta => $path:literal),+ $(,)?) => {{
        $(
            #[cfg($platform)]
            let blob = $crate::EmbeddedBlob::new($name, include_bytes!($path));
        )+
        #[cfg(not(any($($platform),+)))]
        let blob: $crate::EmbeddedBlob =
            compile_error!("no embedded native library for this target");
        blob
    }};
}
