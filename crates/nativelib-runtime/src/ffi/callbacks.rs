//! Native-to-host log callbacks
//!
//! The native log ABI is `void (*)(int level, const char *message, int pii)`
//! and carries no user-data pointer, so a closure cannot be handed across
//! directly. Instead there is a fixed table of slots, each with its own
//! `extern "C"` trampoline monomorphized over the slot index. Binding a sink
//! claims a free slot; the returned [`CallbackTrampoline`] owns the slot and
//! releases it on drop, unless it is leaked after being handed to a module.

use crate::ffi::safety::copy_c_message;
use crate::logging::{LogEvent, LogSink};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Signature native code calls back into
pub type LogCallbackFn = unsafe extern "C" fn(level: c_int, message: *const c_char, pii: c_int);

/// Number of sinks that can be bound at the same time
pub const TRAMPOLINE_SLOTS: usize = 64;

/// Errors that can occur during callback creation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("all {0} callback trampoline slots are in use")]
    SlotsExhausted(usize),
}

type Slot = RwLock<Option<Arc<dyn LogSink>>>;

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: Slot = RwLock::new(None);

static SLOTS: [Slot; TRAMPOLINE_SLOTS] = [EMPTY_SLOT; TRAMPOLINE_SLOTS];

/// Entry point handed to native code for slot `SLOT`
///
/// The message is copied before anything else happens; the buffer belongs to
/// the caller and is not assumed to outlive this call. Panics from the sink
/// are swallowed so they never unwind into native frames.
unsafe extern "C" fn trampoline<const SLOT: usize>(
    level: c_int,
    message: *const c_char,
    pii: c_int,
) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let event = LogEvent::new(level, copy_c_message(message), pii != 0);
        dispatch(SLOT, &event);
    }));
}

fn dispatch(slot: usize, event: &LogEvent) {
    // Clone the sink out so a slow sink never holds the slot lock
    let sink = SLOTS[slot]
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    if let Some(sink) = sink {
        sink.emit(event);
    }
}

macro_rules! trampoline_table {
    ($($slot:literal)*) => {
        [$(trampoline::<$slot> as LogCallbackFn),*]
    };
}

const TRAMPOLINES: [LogCallbackFn; TRAMPOLINE_SLOTS] = trampoline_table!(
    0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
    16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
    32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
    48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
);

/// A native-callable function pointer bound to one host sink
///
/// The pointer stays valid for as long as this value is alive. Dropping it
/// unbinds the sink; a module that still calls the pointer afterwards hits an
/// empty slot and the record is discarded, or, if the slot has since been
/// rebound, reaches the new sink. See [`CallbackTrampoline::leak`].
#[derive(Debug)]
pub struct CallbackTrampoline {
    slot: usize,
}

impl CallbackTrampoline {
    /// Function pointer to pass to the module
    pub fn as_fn(&self) -> LogCallbackFn {
        TRAMPOLINES[self.slot]
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Keep the sink bound for the rest of the process
    ///
    /// Use this once the pointer has been handed to a module that is never
    /// unloaded: the module may call it at any time, so the slot must never
    /// return to the free pool and be rebound to another sink.
    pub fn leak(self) -> LogCallbackFn {
        let callback = self.as_fn();
        std::mem::forget(self);
        callback
    }
}

impl Drop for CallbackTrampoline {
    fn drop(&mut self) {
        *SLOTS[self.slot]
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Builds trampolines for host sinks
pub struct CallbackBridge;

impl CallbackBridge {
    /// Bind `sink` to a free slot and return its trampoline
    pub fn bind(sink: Arc<dyn LogSink>) -> Result<CallbackTrampoline, CallbackError> {
        for (index, slot) in SLOTS.iter().enumerate() {
            let mut guard = slot.write().unwrap_or_else(PoisonError::into_inner);
            if guard.is_none() {
                *guard = Some(sink);
                return Ok(CallbackTrampoline { slot: index });
            }
        }
        Err(CallbackError::SlotsExhausted(TRAMPOLINE_SLOTS))
    }

    /// Number of slots currently bound
    pub fn bound_slots() -> usize {
        SLOTS
            .iter()
            .filter(|slot| {
                slot.read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::CollectingSink;
    use std::ffi::CString;

    #[test]
    fn test_trampoline_table_is_distinct() {
        let first = TRAMPOLINES[0] as usize;
        assert!(TRAMPOLINES[1..].iter().all(|f| *f as usize != first));
    }

    #[test]
    fn test_forwards_decoded_event() {
        let sink = CollectingSink::new();
        let trampoline = CallbackBridge::bind(Arc::new(sink.clone())).unwrap();
        let message = CString::new("hello").unwrap();

        unsafe { (trampoline.as_fn())(2, message.as_ptr(), 0) };

        assert_eq!(sink.events(), vec![LogEvent::new(2, "hello", false)]);
    }

    #[test]
    fn test_leaked_trampoline_stays_bound() {
        let sink = CollectingSink::new();
        let callback = CallbackBridge::bind(Arc::new(sink.clone())).unwrap().leak();
        let message = CString::new("still here").unwrap();

        unsafe { callback(1, message.as_ptr(), 0) };

        assert_eq!(sink.events(), vec![LogEvent::new(1, "still here", false)]);
    }

    #[test]
    fn test_panicking_sink_does_not_unwind() {
        struct Exploding;
        impl LogSink for Exploding {
            fn emit(&self, _event: &LogEvent) {
                panic!("sink failure");
            }
        }

        let trampoline = CallbackBridge::bind(Arc::new(Exploding)).unwrap();
        unsafe { (trampoline.as_fn())(0, std::ptr::null(), 0) };
    }
}
