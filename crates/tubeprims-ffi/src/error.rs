use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use tubeprims_records::RecordError;
use tubeprims_transport::TransportError;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::default();
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let message = message.into();
    let sanitized = message.replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized).unwrap_or_default();
    });
}

/// Record `message` and return `-EINVAL`.
pub(crate) fn set_invalid_argument(message: impl Into<String>) -> i32 {
    set_error_message(message);
    -libc::EINVAL
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

/// Record `err` and return its negative errno.
pub(crate) fn map_transport_error(err: &TransportError) -> i32 {
    set_error_message(err.to_string());
    err.code()
}

/// Record `err` and return its negative errno.
pub(crate) fn map_record_error(err: &RecordError) -> i32 {
    set_error_message(err.to_string());
    err.code()
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}
