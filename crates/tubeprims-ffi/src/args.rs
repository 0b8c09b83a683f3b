use std::ffi::c_void;

use crate::error;

/// Convert a pointer + length into a readable slice.
///
/// # Safety
/// If `len > 0`, `data` must be non-null and readable for `len` bytes.
pub(crate) unsafe fn bytes_arg<'a>(data: *const c_void, len: usize, name: &str) -> Option<&'a [u8]> {
    if len == 0 {
        return Some(&[]);
    }
    if data.is_null() {
        let _ = error::set_invalid_argument(format!("{name} cannot be null when size > 0"));
        return None;
    }

    // SAFETY: Pointer and length are validated above and owned by caller for the call duration.
    Some(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) })
}

/// Convert a pointer + length into a writable slice.
///
/// # Safety
/// If `len > 0`, `data` must be non-null and writable for `len` bytes.
pub(crate) unsafe fn bytes_arg_mut<'a>(
    data: *mut c_void,
    len: usize,
    name: &str,
) -> Option<&'a mut [u8]> {
    if len == 0 {
        return Some(&mut []);
    }
    if data.is_null() {
        let _ = error::set_invalid_argument(format!("{name} cannot be null when size > 0"));
        return None;
    }

    // SAFETY: Pointer and length are validated above and exclusively lent by the caller.
    Some(unsafe { std::slice::from_raw_parts_mut(data.cast::<u8>(), len) })
}

/// `count * size` as a byte length, recording an error on overflow.
pub(crate) fn batch_bytes(count: usize, size: usize) -> Option<usize> {
    let bytes = count.checked_mul(size);
    if bytes.is_none() {
        let _ = error::set_invalid_argument(format!(
            "batch of {count} objects of {size} bytes overflows"
        ));
    }
    bytes
}
