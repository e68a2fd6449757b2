//! Symbol resolution
//!
//! Looks up exports by exact name and turns their addresses into typed
//! function pointers. The module exposes two capabilities:
//!
//! - `int factorial(int)`: required; its absence fails initialization
//! - `void set_log_callback(callback)`: optional; its absence only disables
//!   native log delivery

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::callbacks::{CallbackTrampoline, LogCallbackFn};
use crate::ffi::loader::{NativeModule, SymbolAddress};
use std::os::raw::c_int;
use tracing::{debug, warn};

/// Signature of the computational export
pub type ComputeFn = unsafe extern "C" fn(c_int) -> c_int;

/// Signature of the log callback setter
pub type SetLogCallbackFn = unsafe extern "C" fn(LogCallbackFn);

/// Resolved computational entry point
#[derive(Debug, Clone, Copy)]
pub struct ComputeSymbol {
    f: ComputeFn,
}

impl ComputeSymbol {
    /// Wrap a function pointer directly
    pub fn from_fn(f: ComputeFn) -> Self {
        Self { f }
    }

    /// Invoke the export and return its raw result
    ///
    /// # Safety
    ///
    /// The module the symbol came from must still be loaded.
    pub unsafe fn call(&self, n: i32) -> i32 {
        (self.f)(n)
    }
}

/// Resolved log callback setter
#[derive(Debug, Clone, Copy)]
pub struct LogCallbackSymbol {
    f: SetLogCallbackFn,
}

impl LogCallbackSymbol {
    pub fn from_fn(f: SetLogCallbackFn) -> Self {
        Self { f }
    }

    /// Hand `trampoline` to the module
    ///
    /// # Safety
    ///
    /// The module must still be loaded, and `trampoline` must outlive every
    /// call the module makes through it.
    pub unsafe fn register(&self, trampoline: &CallbackTrampoline) {
        (self.f)(trampoline.as_fn())
    }
}

/// Everything resolved from a module
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub compute: ComputeSymbol,
    pub log_callback: Option<LogCallbackSymbol>,
}

/// Resolves exports from one loaded module
pub struct SymbolResolver<'a> {
    module: &'a dyn NativeModule,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(module: &'a dyn NativeModule) -> Self {
        Self { module }
    }

    /// Raw address of `name`
    pub fn address(&self, name: &str) -> BridgeResult<SymbolAddress> {
        self.module
            .symbol_address(name)
            .ok_or_else(|| BridgeError::symbol_not_found(name, self.module.path()))
    }

    /// Resolve `name` as the computational entry point
    ///
    /// # Safety
    ///
    /// The export must really have the signature `int (int)`.
    pub unsafe fn compute(&self, name: &str) -> BridgeResult<ComputeSymbol> {
        let addr = self.address(name)?;
        let f = std::mem::transmute::<*const std::ffi::c_void, ComputeFn>(addr.as_ptr());
        Ok(ComputeSymbol::from_fn(f))
    }

    /// Resolve `name` as the log callback setter
    ///
    /// # Safety
    ///
    /// The export must really have the signature `void (void (*)(int, const char *, int))`.
    pub unsafe fn log_callback(&self, name: &str) -> BridgeResult<LogCallbackSymbol> {
        let addr = self.address(name)?;
        let f = std::mem::transmute::<*const std::ffi::c_void, SetLogCallbackFn>(addr.as_ptr());
        Ok(LogCallbackSymbol::from_fn(f))
    }

    /// Resolve both capabilities
    ///
    /// A missing compute export is an error; a missing log setter is logged
    /// and reported as `None`.
    ///
    /// # Safety
    ///
    /// Exports found under these names must have the documented signatures.
    pub unsafe fn capabilities(
        &self,
        compute_name: &str,
        log_callback_name: &str,
    ) -> BridgeResult<Capabilities> {
        let compute = self.compute(compute_name)?;
        debug!(symbol = compute_name, "Resolved compute export");

        let log_callback = match self.log_callback(log_callback_name) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                warn!(error = %e, "Native logging disabled");
                None
            }
        };

        Ok(Capabilities {
            compute,
            log_callback,
        })
    }
}
