//! Foreign Function Interface (FFI) infrastructure
//!
//! Everything that touches raw native code lives here:
//! - Dynamic library loading (`loader`)
//! - Export lookup and typed entry points (`symbols`)
//! - Callbacks from native code into the host (`callbacks`)
//!
//! # Safety
//!
//! FFI operations involve `unsafe` code and careful memory management.
//! All unsafe code is isolated in this module with safe wrappers where the
//! invariants can be upheld locally.

pub mod callbacks;
pub mod loader;
pub mod safety;
pub mod symbols;

pub use callbacks::{
    CallbackBridge, CallbackError, CallbackTrampoline, LogCallbackFn, TRAMPOLINE_SLOTS,
};
pub use loader::{DynamicLoader, DynamicModule, ModuleLoader, NativeModule, SymbolAddress};
pub use symbols::{
    Capabilities, ComputeFn, ComputeSymbol, LogCallbackSymbol, SetLogCallbackFn, SymbolResolver,
};
