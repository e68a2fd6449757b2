//! The public surface over the embedded native library
//!
//! [`NativeFacade`] drives extraction, loading and symbol resolution exactly
//! once, no matter how many threads race on the first call. The outcome is
//! cached for the life of the facade: a failed initialization is never
//! retried, and every later caller receives the original error.
//!
//! ```text
//! Uninitialized --> Initializing --> Ready
//!                                \-> Failed
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use nativelib_runtime::{EmbeddedBlob, NativeFacade};
//! use std::sync::OnceLock;
//!
//! static NATIVE: EmbeddedBlob = EmbeddedBlob::new("TestNativeLibrary", include_bytes!("libTestNativeLibrary.so"));
//! static FACADE: OnceLock<NativeFacade> = OnceLock::new();
//!
//! fn factorial(n: i32) -> nativelib_runtime::BridgeResult<i32> {
//!     FACADE.get_or_init(|| NativeFacade::new(NATIVE)).compute(n)
//! }
//! ```

use crate::blob::EmbeddedBlob;
use crate::error::{BridgeError, BridgeResult, NativeCallError};
use crate::extract::{ExtractedArtifact, ResourceExtractor};
use crate::ffi::callbacks::CallbackBridge;
use crate::ffi::loader::{DynamicLoader, ModuleLoader, NativeModule};
use crate::ffi::symbols::{Capabilities, ComputeSymbol, SymbolResolver};
use crate::logging::{sink_from_config, LogSink};
use nativelib_config::{BridgeConfig, CleanupPolicy};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of a facade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

const PHASE_UNINITIALIZED: u8 = 0;
const PHASE_INITIALIZING: u8 = 1;

/// Interpret a raw return value from the compute export
///
/// The module reports failure by returning 0. That is also what a correct
/// computation returning zero looks like, and the two cannot be told apart
/// from the return value alone; every 0 is treated as failure.
pub fn interpret_return(input: i32, raw: i32) -> Result<i32, NativeCallError> {
    if raw == 0 {
        Err(NativeCallError::FailureSentinel { input })
    } else {
        Ok(raw)
    }
}

/// One deadline-bound call queued for the worker
struct CallJob {
    n: i32,
    deadline: Instant,
    reply: mpsc::Sender<i32>,
}

/// The single thread that runs deadline-bound calls for one module
///
/// Calls run one at a time in arrival order. A job whose caller already gave
/// up is skipped, so a hung call leaves at most a queue of stale jobs behind
/// it, never extra threads.
struct CallWorker {
    jobs: Mutex<mpsc::Sender<CallJob>>,
}

impl CallWorker {
    fn spawn(compute: ComputeSymbol) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<CallJob>();

        std::thread::Builder::new()
            .name("nativelib-call".to_string())
            .spawn(move || {
                // Exits once the owning state, and with it the sender, is gone
                for job in rx {
                    if Instant::now() >= job.deadline {
                        debug!(input = job.n, "Skipping native call abandoned by its caller");
                        continue;
                    }
                    // Safety: the module this symbol came from is never unloaded
                    let raw = unsafe { compute.call(job.n) };
                    let _ = job.reply.send(raw);
                }
            })?;

        Ok(Self {
            jobs: Mutex::new(tx),
        })
    }

    fn call(&self, n: i32, timeout: Duration) -> Result<i32, NativeCallError> {
        let (reply, answer) = mpsc::channel();
        let deadline = Instant::now() + timeout;
        let job = CallJob { n, deadline, reply };

        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(job)
            .map_err(|_| NativeCallError::WorkerLost { input: n })?;

        match answer.recv_timeout(timeout) {
            Ok(raw) => Ok(raw),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(NativeCallError::Timeout { input: n, timeout })
            }
            // The worker drops jobs it finds past their deadline
            Err(mpsc::RecvTimeoutError::Disconnected) if Instant::now() >= deadline => {
                Err(NativeCallError::Timeout { input: n, timeout })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(NativeCallError::Panicked { input: n })
            }
        }
    }
}

/// Everything produced by a successful initialization
struct ReadyState {
    /// Slot of the trampoline registered with the module, once registered
    registration: OnceLock<Option<usize>>,
    capabilities: Capabilities,
    call_gate: Mutex<()>,
    worker: OnceLock<Option<CallWorker>>,
    artifact: ExtractedArtifact,
    module: Box<dyn NativeModule>,
}

impl ReadyState {
    /// Build and register the log trampoline on first use
    fn ensure_logging(&self, sink: &Arc<dyn LogSink>) -> bool {
        self.registration
            .get_or_init(|| {
                let setter = self.capabilities.log_callback?;

                match CallbackBridge::bind(Arc::clone(sink)) {
                    Ok(trampoline) => {
                        let slot = trampoline.slot();
                        // Safety: the trampoline is leaked right after, so the
                        // module's copy of the pointer never goes stale
                        unsafe { setter.register(&trampoline) };
                        trampoline.leak();
                        debug!(
                            slot,
                            module = %self.module.path().display(),
                            "Registered native log callback"
                        );
                        Some(slot)
                    }
                    Err(e) => {
                        warn!(error = %e, "Native logging disabled");
                        None
                    }
                }
            })
            .is_some()
    }

    fn invoke(&self, n: i32, serialize: bool) -> i32 {
        let _guard = serialize.then(|| {
            self.call_gate
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        });

        // Safety: the module is owned by this state and never unloaded
        unsafe { self.capabilities.compute.call(n) }
    }

    /// Run the call on this module's worker and stop waiting after `timeout`
    ///
    /// A call that overruns keeps running to completion on the worker, and
    /// later calls queue behind it.
    fn invoke_with_deadline(&self, n: i32, timeout: Duration) -> Result<i32, NativeCallError> {
        let worker = self.worker.get_or_init(|| {
            match CallWorker::spawn(self.capabilities.compute) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    warn!(error = %e, "Failed to start native call worker");
                    None
                }
            }
        });

        match worker {
            Some(worker) => worker.call(n, timeout),
            None => Err(NativeCallError::WorkerLost { input: n }),
        }
    }
}

/// Process-facing entry point for the embedded native library
pub struct NativeFacade {
    blob: EmbeddedBlob,
    config: BridgeConfig,
    loader: Box<dyn ModuleLoader>,
    sink: Arc<dyn LogSink>,
    phase: AtomicU8,
    outcome: OnceLock<Result<ReadyState, BridgeError>>,
}

impl NativeFacade {
    /// Facade with default configuration and the OS loader
    pub fn new(blob: EmbeddedBlob) -> Self {
        Self::build(blob, BridgeConfig::default())
    }

    /// Facade with an explicit configuration
    pub fn with_config(blob: EmbeddedBlob, config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Self::build(blob, config))
    }

    fn build(blob: EmbeddedBlob, config: BridgeConfig) -> Self {
        Self {
            blob,
            sink: sink_from_config(&config),
            config,
            loader: Box::new(DynamicLoader::new()),
            phase: AtomicU8::new(PHASE_UNINITIALIZED),
            outcome: OnceLock::new(),
        }
    }

    /// Replace the module loader
    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Replace the destination for native log records
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> FacadeState {
        match self.outcome.get() {
            Some(Ok(_)) => FacadeState::Ready,
            Some(Err(_)) => FacadeState::Failed,
            None if self.phase.load(Ordering::Acquire) == PHASE_INITIALIZING => {
                FacadeState::Initializing
            }
            None => FacadeState::Uninitialized,
        }
    }

    /// Extract, load and resolve, once
    ///
    /// Concurrent first callers block until the single initialization
    /// finishes and then all observe its outcome.
    pub fn ensure_initialized(&self) -> BridgeResult<()> {
        self.ready().map(|_| ())
    }

    /// Call the compute export with `n`
    ///
    /// Initializes on first use and registers the log callback when the
    /// module supports it. A raw result of 0 is reported as
    /// [`NativeCallError::FailureSentinel`].
    pub fn compute(&self, n: i32) -> BridgeResult<i32> {
        let ready = self.ready()?;

        if self.config.logging_enabled() {
            ready.ensure_logging(&self.sink);
        }

        let raw = match self.config.call_timeout() {
            Some(timeout) => ready.invoke_with_deadline(n, timeout)?,
            None => ready.invoke(n, self.config.serialize_calls()),
        };

        Ok(interpret_return(n, raw)?)
    }

    /// Whether a log callback has been registered with the module
    pub fn logging_enabled(&self) -> bool {
        match self.outcome.get() {
            Some(Ok(ready)) => matches!(ready.registration.get(), Some(Some(_))),
            _ => false,
        }
    }

    /// Whether the module exports the log callback setter
    pub fn supports_logging(&self) -> bool {
        match self.outcome.get() {
            Some(Ok(ready)) => ready.capabilities.log_callback.is_some(),
            _ => false,
        }
    }

    /// Where the library was extracted, once initialized
    pub fn artifact(&self) -> Option<&ExtractedArtifact> {
        match self.outcome.get() {
            Some(Ok(ready)) => Some(&ready.artifact),
            _ => None,
        }
    }

    fn ready(&self) -> BridgeResult<&ReadyState> {
        self.outcome
            .get_or_init(|| {
                self.phase.store(PHASE_INITIALIZING, Ordering::Release);
                let outcome = self.initialize();
                if let Err(e) = &outcome {
                    warn!(error = %e, "Native library initialization failed permanently");
                }
                outcome
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn initialize(&self) -> BridgeResult<ReadyState> {
        let artifact = ResourceExtractor::from_config(&self.config).extract(&self.blob)?;
        let cleanup = self.config.cleanup();

        let module = match self.loader.open(artifact.path()) {
            Ok(module) => module,
            Err(e) => {
                if cleanup != CleanupPolicy::Keep {
                    remove_artifact(&artifact);
                }
                return Err(e);
            }
        };

        if cleanup == CleanupPolicy::RemoveAfterLoad {
            remove_loaded_artifact(&artifact);
        }

        // Safety: the export names are the documented ABI of the embedded library
        let capabilities = unsafe {
            SymbolResolver::new(module.as_ref()).capabilities(
                self.config.compute_symbol(),
                self.config.log_callback_symbol(),
            )?
        };

        info!(
            library = self.blob.name(),
            path = %artifact.path().display(),
            logging = capabilities.log_callback.is_some(),
            "Native library ready"
        );

        Ok(ReadyState {
            registration: OnceLock::new(),
            capabilities,
            call_gate: Mutex::new(()),
            worker: OnceLock::new(),
            artifact,
            module,
        })
    }
}

fn remove_artifact(artifact: &ExtractedArtifact) {
    if let Err(e) = artifact.remove() {
        warn!(
            path = %artifact.path().display(),
            error = %e,
            "Failed to remove extracted library"
        );
    }
}

#[cfg(unix)]
fn remove_loaded_artifact(artifact: &ExtractedArtifact) {
    // The loader keeps its own mapping; the directory entry is no longer needed
    remove_artifact(artifact);
}

#[cfg(not(unix))]
fn remove_loaded_artifact(artifact: &ExtractedArtifact) {
    // A loaded DLL cannot be deleted while mapped
    warn!(
        path = %artifact.path().display(),
        "Keeping loaded library on disk; it cannot be removed while in use"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_nonzero_is_success() {
        assert_eq!(interpret_return(5, 120), Ok(120));
        assert_eq!(interpret_return(-1, -1), Ok(-1));
    }

    #[test]
    fn test_interpret_zero_is_sentinel() {
        assert_eq!(
            interpret_return(0, 0),
            Err(NativeCallError::FailureSentinel { input: 0 })
        );
    }

    #[test]
    fn test_new_facade_is_uninitialized() {
        static BLOB: EmbeddedBlob = EmbeddedBlob::new("unused", b"");
        let facade = NativeFacade::new(BLOB);

        assert_eq!(facade.state(), FacadeState::Uninitialized);
        assert!(facade.artifact().is_none());
        assert!(!facade.logging_enabled());
    }

    #[test]
    fn test_with_config_keeps_config() {
        static BLOB: EmbeddedBlob = EmbeddedBlob::new("unused", b"");
        let config = BridgeConfig::parse("[extract]\ncleanup = \"keep\"\n").unwrap();
        let facade = NativeFacade::with_config(BLOB, config.clone()).unwrap();

        assert_eq!(facade.config(), &config);
        assert_eq!(facade.state(), FacadeState::Uninitialized);
    }

    #[test]
    fn test_facade_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NativeFacade>();
    }
}
