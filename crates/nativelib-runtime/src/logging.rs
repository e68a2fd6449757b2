//! Host-side handling of log records emitted by the native module

use nativelib_config::{BridgeConfig, SinkKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Severity as understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Verbose,
    Trace,
}

impl LogLevel {
    /// Map a raw native severity (0 = most severe) onto a host level
    pub fn from_native(level: i32) -> Self {
        match level {
            i32::MIN..=0 => LogLevel::Error,
            1 => LogLevel::Warning,
            2 => LogLevel::Info,
            3 => LogLevel::Verbose,
            _ => LogLevel::Trace,
        }
    }
}

/// One decoded callback invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Raw severity exactly as the module passed it
    pub level: i32,
    pub message: String,
    /// The module flagged the message as containing personal data
    pub pii: bool,
}

impl LogEvent {
    pub fn new(level: i32, message: impl Into<String>, pii: bool) -> Self {
        Self {
            level,
            message: message.into(),
            pii,
        }
    }

    pub fn severity(&self) -> LogLevel {
        LogLevel::from_native(self.level)
    }
}

/// Destination for native log records
///
/// Called synchronously on whatever thread the module logs from, usually
/// the thread blocked in the native call. Implementations must not block
/// for long.
pub trait LogSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

const REDACTED: &str = "<redacted: contains PII>";

/// Forwards native records as `tracing` events under target `nativelib::native`
#[derive(Debug, Default, Clone)]
pub struct TracingSink {
    show_pii: bool,
}

impl TracingSink {
    pub fn new(show_pii: bool) -> Self {
        Self { show_pii }
    }
}

impl LogSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        let message = if event.pii && !self.show_pii {
            REDACTED
        } else {
            event.message.as_str()
        };
        let native_level = event.level;

        match event.severity() {
            LogLevel::Error => tracing::error!(target: "nativelib::native", native_level, "{}", message),
            LogLevel::Warning => tracing::warn!(target: "nativelib::native", native_level, "{}", message),
            LogLevel::Info => tracing::info!(target: "nativelib::native", native_level, "{}", message),
            LogLevel::Verbose => tracing::debug!(target: "nativelib::native", native_level, "{}", message),
            LogLevel::Trace => tracing::trace!(target: "nativelib::native", native_level, "{}", message),
        }
    }
}

/// Prints `[Level N] message` to stdout
#[derive(Debug, Default, Clone)]
pub struct StdoutSink {
    show_pii: bool,
}

impl StdoutSink {
    pub fn new(show_pii: bool) -> Self {
        Self { show_pii }
    }

    /// The line this sink prints for `event`
    pub fn format(&self, event: &LogEvent) -> String {
        let message = if event.pii && !self.show_pii {
            REDACTED
        } else {
            event.message.as_str()
        };
        format!("[Level {}] {}", event.level, message)
    }
}

impl LogSink for StdoutSink {
    fn emit(&self, event: &LogEvent) {
        println!("{}", self.format(event));
    }
}

/// Buffers every event in memory
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: the buffer is plain data
    fn lock(&self) -> MutexGuard<'_, Vec<LogEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of everything received so far
    pub fn events(&self) -> Vec<LogEvent> {
        self.lock().clone()
    }

    /// Remove and return everything received so far
    pub fn drain(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.lock())
    }
}

impl LogSink for CollectingSink {
    fn emit(&self, event: &LogEvent) {
        self.lock().push(event.clone());
    }
}

/// Build the sink a configuration asks for
pub fn sink_from_config(config: &BridgeConfig) -> Arc<dyn LogSink> {
    match config.sink() {
        SinkKind::Tracing => Arc::new(TracingSink::new(config.show_pii())),
        SinkKind::Stdout => Arc::new(StdoutSink::new(config.show_pii())),
    }
}
