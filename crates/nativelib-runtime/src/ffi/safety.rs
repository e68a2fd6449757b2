//! Safe wrappers for pointers handed to us by native code

use std::ffi::CStr;
use std::os::raw::c_char;

/// Safe wrapper for null pointer checks
pub fn check_null<T>(ptr: *const T) -> Result<*const T, &'static str> {
    if ptr.is_null() {
        Err("Null pointer")
    } else {
        Ok(ptr)
    }
}

/// Copy a native, NUL-terminated message into an owned string
///
/// A null pointer decodes to an empty string. Invalid UTF-8 is replaced
/// rather than rejected, since log text should never be dropped.
///
/// # Safety
///
/// A non-null `ptr` must point to a NUL-terminated buffer that stays valid
/// for the duration of this call. Nothing is borrowed past the return.
pub unsafe fn copy_c_message(ptr: *const c_char) -> String {
    match check_null(ptr) {
        Ok(ptr) => CStr::from_ptr(ptr).to_string_lossy().into_owned(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_check_null_valid() {
        let x = 42;
        assert!(check_null(&x as *const i32).is_ok());
    }

    #[test]
    fn test_check_null_invalid() {
        assert!(check_null(std::ptr::null::<i32>()).is_err());
    }

    #[test]
    fn test_copy_message() {
        let msg = CString::new("hello").unwrap();
        assert_eq!(unsafe { copy_c_message(msg.as_ptr()) }, "hello");
    }

    #[test]
    fn test_copy_null_message() {
        assert_eq!(unsafe { copy_c_message(std::ptr::null()) }, "");
    }

    #[test]
    fn test_copy_stops_at_terminator() {
        let buf = b"first\0second\0";
        let text = unsafe { copy_c_message(buf.as_ptr() as *const c_char) };
        assert_eq!(text, "first");
    }

    #[test]
    fn test_copy_invalid_utf8() {
        let buf = b"ok\xff\0";
        let text = unsafe { copy_c_message(buf.as_ptr() as *const c_char) };
        assert_eq!(text, "ok\u{fffd}");
    }
}
