//! Trampoline slot table behavior
//!
//! The slot table is process-wide, so these tests live in their own binary
//! and run serially.

use nativelib_runtime::ffi::TRAMPOLINE_SLOTS;
use nativelib_runtime::{CallbackBridge, CallbackError, CollectingSink, LogEvent};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::ffi::CString;
use std::sync::Arc;

#[test]
#[serial]
fn test_slot_released_on_drop() {
    assert_eq!(CallbackBridge::bound_slots(), 0);

    let trampoline = CallbackBridge::bind(Arc::new(CollectingSink::new())).unwrap();
    assert_eq!(CallbackBridge::bound_slots(), 1);

    drop(trampoline);
    assert_eq!(CallbackBridge::bound_slots(), 0);
}

#[test]
#[serial]
fn test_slots_exhausted() {
    let mut held: Vec<_> = (0..TRAMPOLINE_SLOTS)
        .map(|_| CallbackBridge::bind(Arc::new(CollectingSink::new())).unwrap())
        .collect();

    let overflow = CallbackBridge::bind(Arc::new(CollectingSink::new()));
    assert_eq!(
        overflow.unwrap_err(),
        CallbackError::SlotsExhausted(TRAMPOLINE_SLOTS)
    );

    // Freeing any slot makes room again
    let freed = held.swap_remove(17).slot();
    let rebound = CallbackBridge::bind(Arc::new(CollectingSink::new())).unwrap();
    assert_eq!(rebound.slot(), freed);

    drop(rebound);
    drop(held);
    assert_eq!(CallbackBridge::bound_slots(), 0);
}

#[test]
#[serial]
fn test_each_trampoline_reaches_its_own_sink() {
    let first = CollectingSink::new();
    let second = CollectingSink::new();
    let a = CallbackBridge::bind(Arc::new(first.clone())).unwrap();
    let b = CallbackBridge::bind(Arc::new(second.clone())).unwrap();
    let message = CString::new("to b").unwrap();

    unsafe { (b.as_fn())(3, message.as_ptr(), 0) };

    assert!(first.events().is_empty());
    assert_eq!(second.events(), vec![LogEvent::new(3, "to b", false)]);
    drop((a, b));
}

#[test]
#[serial]
fn test_call_after_release_is_discarded() {
    let sink = CollectingSink::new();
    let trampoline = CallbackBridge::bind(Arc::new(sink.clone())).unwrap();
    let stale = trampoline.as_fn();
    drop(trampoline);

    let message = CString::new("late").unwrap();
    unsafe { stale(1, message.as_ptr(), 0) };

    assert!(sink.events().is_empty());
}

#[test]
#[serial]
fn test_message_buffer_not_retained() {
    let sink = CollectingSink::new();
    let trampoline = CallbackBridge::bind(Arc::new(sink.clone())).unwrap();

    let message = CString::new("transient").unwrap();
    unsafe { (trampoline.as_fn())(2, message.as_ptr(), 1) };
    drop(message);

    assert_eq!(sink.events(), vec![LogEvent::new(2, "transient", true)]);
}
