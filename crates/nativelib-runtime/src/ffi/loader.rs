//! Dynamic library loading
//!
//! Opens an executable module from a file path using `libloading` and
//! exposes its exports by name. The seam is a pair of traits so the facade
//! can be driven by an in-process fake in tests.

use crate::error::{BridgeError, BridgeResult};
use libloading::Library;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Address of a resolved export
///
/// Stored as an integer so it can cross threads; only turned back into a
/// typed function pointer by the symbol resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    /// Wrap a raw export address, rejecting null
    pub fn new(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr as usize))
        }
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0 as *const c_void
    }
}

/// A loaded executable module
pub trait NativeModule: Send + Sync {
    /// File the module was opened from
    fn path(&self) -> &Path;

    /// Look up an export by exact name
    fn symbol_address(&self, name: &str) -> Option<SymbolAddress>;
}

/// Opens executable modules
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> BridgeResult<Box<dyn NativeModule>>;
}

/// Loader backed by the operating system's dynamic linker
///
/// # Safety
///
/// Opening a library runs its initializers inside this process. Only open
/// files whose contents you control.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLoader;

impl DynamicLoader {
    pub fn new() -> Self {
        Self
    }

    #[cfg(unix)]
    fn open_platform(path: &Path) -> Result<Library, libloading::Error> {
        use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

        // Bind everything up front so a missing dependency fails here, not mid-call
        unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL).map(Library::from) }
    }

    #[cfg(windows)]
    fn open_platform(path: &Path) -> Result<Library, libloading::Error> {
        use libloading::os::windows::{Library as WindowsLibrary, LOAD_WITH_ALTERED_SEARCH_PATH};

        // Absolute path + altered search order: dependencies resolve next to
        // the artifact, never from the current directory
        unsafe {
            WindowsLibrary::load_with_flags(path, LOAD_WITH_ALTERED_SEARCH_PATH)
                .map(Library::from)
        }
    }
}

impl ModuleLoader for DynamicLoader {
    fn open(&self, path: &Path) -> BridgeResult<Box<dyn NativeModule>> {
        if !path.is_absolute() {
            return Err(BridgeError::load(
                path,
                "refusing to open a library by relative path",
            ));
        }

        let library = Self::open_platform(path).map_err(|e| BridgeError::load(path, e))?;
        debug!(path = %path.display(), "Opened native module");

        Ok(Box::new(DynamicModule {
            path: path.to_path_buf(),
            library: ManuallyDrop::new(library),
        }))
    }
}

/// A module opened by [`DynamicLoader`]
///
/// The library is never closed, even when this value is dropped: native code
/// may still hold pointers into host memory (such as a registered callback)
/// and exported addresses may have been copied out.
pub struct DynamicModule {
    path: PathBuf,
    library: ManuallyDrop<Library>,
}

impl NativeModule for DynamicModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol_address(&self, name: &str) -> Option<SymbolAddress> {
        if name.as_bytes().contains(&0) {
            return None;
        }

        // Safety: only the address is read here; the resolver is responsible
        // for giving it the right type.
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.ok()?;
        SymbolAddress::new(*symbol)
    }
}
