//! Shared test utilities
//!
//! Provides an in-process stand-in for the embedded native library so the
//! facade can be driven end to end without a compiled shared object. The
//! fake exports are plain `extern "C"` functions; the fake module maps
//! export names to their addresses.

#![allow(dead_code)]

use nativelib_runtime::ffi::LogCallbackFn;
use nativelib_runtime::{
    BridgeConfig, BridgeError, BridgeResult, EmbeddedBlob, ModuleLoader, NativeModule,
    SymbolAddress,
};
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub static FAKE_BLOB: EmbeddedBlob = EmbeddedBlob::new("FakeNativeLibrary", b"fake library image");

/// How long `slow_factorial` blocks before answering
pub const SLOW_CALL: Duration = Duration::from_millis(400);

/// Callback most recently handed to `set_log_callback`, as an address
static REGISTERED_CALLBACK: Mutex<Option<usize>> = Mutex::new(None);

fn registered_callback() -> Option<LogCallbackFn> {
    let addr = (*REGISTERED_CALLBACK.lock().unwrap())?;
    Some(unsafe { std::mem::transmute::<usize, LogCallbackFn>(addr) })
}

/// Forget whatever callback the fake module holds
pub fn reset_native_callback() {
    *REGISTERED_CALLBACK.lock().unwrap() = None;
}

/// Act like the native module logging through its registered callback
///
/// Returns false when no callback has been registered.
pub fn native_log(level: c_int, message: Option<&str>, pii: bool) -> bool {
    let Some(callback) = registered_callback() else {
        return false;
    };
    let message = message.map(|m| CString::new(m).unwrap());
    let ptr = message.as_ref().map_or(std::ptr::null(), |m| m.as_ptr());

    unsafe { callback(level, ptr, pii as c_int) };
    true
}

/// Calls `slow_factorial` has started so far, across all tests
static SLOW_CALLS: AtomicUsize = AtomicUsize::new(0);

pub fn slow_calls_started() -> usize {
    SLOW_CALLS.load(Ordering::SeqCst)
}

// Reports failure with 0, including for an input of 0 whose true result is 1
extern "C" fn fake_factorial(n: c_int) -> c_int {
    native_log(2, Some(&format!("factorial({})", n)), false);
    if n <= 0 {
        return 0;
    }
    (1..=n).product()
}

// Does not log: it may still be running after its test has finished
extern "C" fn slow_factorial(n: c_int) -> c_int {
    SLOW_CALLS.fetch_add(1, Ordering::SeqCst);
    std::thread::sleep(SLOW_CALL);
    (1..=n.max(0)).product()
}

extern "C" fn fake_set_log_callback(callback: LogCallbackFn) {
    *REGISTERED_CALLBACK.lock().unwrap() = Some(callback as usize);
}

/// Which exports the fake module carries
#[derive(Debug, Clone, Copy)]
pub enum Exports {
    /// `factorial`, `slow_factorial` and `set_log_callback`
    Full,
    /// No log callback setter
    ComputeOnly,
    /// No compute export
    LoggingOnly,
}

pub struct FakeModule {
    path: PathBuf,
    exports: HashMap<&'static str, SymbolAddress>,
}

impl FakeModule {
    pub fn new(path: &Path, exports: Exports) -> Self {
        let compute: [(&'static str, *const c_void); 2] = [
            ("factorial", fake_factorial as *const c_void),
            ("slow_factorial", slow_factorial as *const c_void),
        ];
        let logging = ("set_log_callback", fake_set_log_callback as *const c_void);

        let table: Vec<(&'static str, *const c_void)> = match exports {
            Exports::Full => compute.into_iter().chain([logging]).collect(),
            Exports::ComputeOnly => compute.into_iter().collect(),
            Exports::LoggingOnly => vec![logging],
        };

        Self {
            path: path.to_path_buf(),
            exports: table
                .into_iter()
                .map(|(name, ptr)| (name, SymbolAddress::new(ptr).unwrap()))
                .collect(),
        }
    }
}

impl NativeModule for FakeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol_address(&self, name: &str) -> Option<SymbolAddress> {
        self.exports.get(name).copied()
    }
}

/// Loader that hands out fake modules and counts how often it was asked
#[derive(Clone)]
pub struct CountingLoader {
    exports: Exports,
    fail_with: Option<String>,
    opens: Arc<AtomicUsize>,
    opened_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl CountingLoader {
    pub fn new(exports: Exports) -> Self {
        Self {
            exports,
            fail_with: None,
            opens: Arc::new(AtomicUsize::new(0)),
            opened_paths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A loader whose every open fails with `reason`
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::new(Exports::Full)
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.opened_paths.lock().unwrap().clone()
    }
}

impl ModuleLoader for CountingLoader {
    fn open(&self, path: &Path) -> BridgeResult<Box<dyn NativeModule>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened_paths.lock().unwrap().push(path.to_path_buf());

        // Widen the window in which racing callers could slip past the gate
        std::thread::sleep(Duration::from_millis(20));

        match &self.fail_with {
            Some(reason) => Err(BridgeError::load(path, reason)),
            None => Ok(Box::new(FakeModule::new(path, self.exports))),
        }
    }
}

/// Bridge configuration extracting into `scratch_dir`
///
/// `extra` is appended verbatim, so callers can add further sections.
pub fn config_in(scratch_dir: &Path, cleanup: &str, extra: &str) -> BridgeConfig {
    let toml = format!(
        "[extract]\nscratch_dir = '{}'\ncleanup = \"{}\"\n{}",
        scratch_dir.display(),
        cleanup,
        extra
    );
    BridgeConfig::parse(&toml).unwrap()
}

/// Files currently present in `dir`
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}
