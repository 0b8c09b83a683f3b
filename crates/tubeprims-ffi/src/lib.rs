//! tubeprims-ffi: C-ABI exports for tubes and record batching.
//!
//! Every fallible call returns a negative errno on failure; the message for
//! the most recent failure on the calling thread is available from
//! `tube_last_error`.

mod args;
mod error;
mod tube;
mod types;

use std::panic::AssertUnwindSafe;

pub use tube::{
    tube_free, tube_from_fd, tube_get_fd, tube_get_send_fd, tube_init_check, tube_move_out_fd,
    tube_new, tube_new_default, tube_read, tube_recv_objects, tube_send_objects, tube_write,
};
pub use types::{TubeHandle, TUBE_DEFAULT_BUFFER_SIZE};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

/// Clear the calling thread's last error message.
#[no_mangle]
pub extern "C" fn tube_clear_error() {
    ffi_boundary((), error::clear_error_state);
}

/// Message for the calling thread's most recent failure (empty if none).
///
/// The pointer stays valid until the next call on this thread.
#[no_mangle]
pub extern "C" fn tube_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    #[test]
    fn last_error_starts_empty_after_clear() {
        tube_clear_error();
        let ptr = tube_last_error();
        assert!(!ptr.is_null());

        // SAFETY: tube_last_error returns a pointer to a thread-local CString.
        let text = unsafe { CStr::from_ptr(ptr).to_str().unwrap() };
        assert!(text.is_empty());
    }

    #[test]
    fn boundary_catches_panics() {
        let value = ffi_boundary(-1, || -> i32 { panic!("boom") });
        assert_eq!(value, -1);

        // SAFETY: tube_last_error returns a pointer to a thread-local CString.
        let text = unsafe { CStr::from_ptr(tube_last_error()).to_str().unwrap() };
        assert_eq!(text, "panic across FFI boundary");
    }

    #[test]
    fn default_buffer_size_is_exported() {
        assert_eq!(TUBE_DEFAULT_BUFFER_SIZE, 4096);
    }
}
