use std::ffi::c_void;
use std::os::fd::{BorrowedFd, IntoRawFd};
use std::os::raw::c_int;

use tubeprims_records::{recv_records, send_records};
use tubeprims_transport::{FdEnvelope, Tube};

use crate::args::{batch_bytes, bytes_arg, bytes_arg_mut};
use crate::error;
use crate::types::TubeHandle;

fn into_handle(tube: Tube) -> TubeHandle {
    Box::into_raw(Box::new(tube)).cast::<c_void>()
}

fn with_tube<T>(handle: TubeHandle, on_error: T, f: impl FnOnce(&Tube) -> T) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("tube handle cannot be null");
        return on_error;
    }

    let tube = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &*(handle as *const Tube) }
    };

    f(tube)
}

fn with_tube_mut<T>(handle: TubeHandle, on_error: T, f: impl FnOnce(&mut Tube) -> T) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("tube handle cannot be null");
        return on_error;
    }

    let tube = {
        // SAFETY: Pointer validity and exclusive access are guaranteed by the caller.
        unsafe { &mut *(handle as *mut Tube) }
    };

    f(tube)
}

/// Create a tube with the default 4 KiB buffers.
///
/// Always returns a handle; check it with `tube_init_check`.
#[no_mangle]
pub extern "C" fn tube_new_default() -> TubeHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || into_handle(Tube::new()))
}

/// Create a tube with `bufsize` bytes of forward buffering.
///
/// Always returns a handle; check it with `tube_init_check`.
#[no_mangle]
pub extern "C" fn tube_new(bufsize: usize) -> TubeHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        into_handle(Tube::with_buffer_size(bufsize))
    })
}

/// Create a receive-only tube by duplicating `fd`.
///
/// A negative `fd` yields a broken tube (`-EBADF`).
///
/// # Safety
/// `fd` must be negative or an open descriptor for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn tube_from_fd(fd: c_int) -> TubeHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        if fd < 0 {
            error::set_error_message(format!("invalid descriptor {fd}"));
            return into_handle(Tube::from_envelope(&FdEnvelope::new()));
        }
        // SAFETY: The caller guarantees `fd` is open for the duration of the call.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        into_handle(Tube::from_fd(borrowed))
    })
}

/// Release a tube and close its remaining descriptors.
///
/// # Safety
/// `handle` must be null or a handle returned by this library, not freed before.
#[no_mangle]
pub unsafe extern "C" fn tube_free(handle: TubeHandle) {
    crate::ffi_boundary((), || {
        if handle.is_null() {
            return;
        }
        // SAFETY: Handle was allocated by `into_handle` and ownership returns here.
        unsafe {
            drop(Box::from_raw(handle as *mut Tube));
        }
    });
}

/// `0` when the tube can receive, otherwise the negative errno explaining why.
///
/// # Safety
/// `handle` must be a live handle returned by this library.
#[no_mangle]
pub unsafe extern "C" fn tube_init_check(handle: TubeHandle) -> c_int {
    crate::ffi_boundary(-libc::EIO, || {
        with_tube(handle, -libc::EINVAL, |tube| match tube.init_check() {
            Ok(()) => 0,
            Err(err) => error::map_transport_error(&err),
        })
    })
}

/// Receive descriptor for readiness polling (borrowed, do not close).
///
/// Negative when the tube is broken or the descriptor was moved out.
///
/// # Safety
/// `handle` must be a live handle returned by this library.
#[no_mangle]
pub unsafe extern "C" fn tube_get_fd(handle: TubeHandle) -> c_int {
    crate::ffi_boundary(-libc::EIO, || {
        with_tube(handle, -libc::EINVAL, |tube| tube.raw_receive_fd())
    })
}

/// Send descriptor (borrowed, do not close); `-1` when absent.
///
/// # Safety
/// `handle` must be a live handle returned by this library.
#[no_mangle]
pub unsafe extern "C" fn tube_get_send_fd(handle: TubeHandle) -> c_int {
    crate::ffi_boundary(-libc::EIO, || {
        with_tube(handle, -libc::EINVAL, |tube| tube.raw_send_fd())
    })
}

/// Send `size` bytes without blocking. Returns bytes sent or a negative errno.
///
/// # Safety
/// `handle` must be a live handle; `buf` must be readable for `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn tube_write(handle: TubeHandle, buf: *const c_void, size: usize) -> isize {
    crate::ffi_boundary(-libc::EIO as isize, || {
        with_tube(handle, -libc::EINVAL as isize, |tube| {
            // SAFETY: The caller guarantees `buf` is readable for `size` bytes.
            let Some(data) = (unsafe { bytes_arg(buf, size, "buf") }) else {
                return -libc::EINVAL as isize;
            };
            match tube.write(data) {
                Ok(n) => n as isize,
                Err(err) => error::map_transport_error(&err) as isize,
            }
        })
    })
}

/// Receive up to `size` bytes without blocking. Returns bytes received,
/// `0` when nothing is pending, or a negative errno.
///
/// # Safety
/// `handle` must be a live handle; `buf` must be writable for `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn tube_read(handle: TubeHandle, buf: *mut c_void, size: usize) -> isize {
    crate::ffi_boundary(-libc::EIO as isize, || {
        with_tube(handle, -libc::EINVAL as isize, |tube| {
            // SAFETY: The caller guarantees `buf` is writable for `size` bytes.
            let Some(data) = (unsafe { bytes_arg_mut(buf, size, "buf") }) else {
                return -libc::EINVAL as isize;
            };
            match tube.read(data) {
                Ok(n) => n as isize,
                Err(err) => error::map_transport_error(&err) as isize,
            }
        })
    })
}

/// Send `count` objects of `obj_size` bytes as one batch.
///
/// Returns the number of objects sent or a negative errno. Aborts the
/// process if the tube reports a partial object.
///
/// # Safety
/// `handle` must be a live handle; `events` must be readable for
/// `count * obj_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn tube_send_objects(
    handle: TubeHandle,
    events: *const c_void,
    count: usize,
    obj_size: usize,
) -> isize {
    crate::ffi_boundary(-libc::EIO as isize, || {
        with_tube(handle, -libc::EINVAL as isize, |tube| {
            let Some(len) = batch_bytes(count, obj_size) else {
                return -libc::EINVAL as isize;
            };
            // SAFETY: The caller guarantees `events` is readable for `count * obj_size` bytes.
            let Some(data) = (unsafe { bytes_arg(events, len, "events") }) else {
                return -libc::EINVAL as isize;
            };
            match send_records(tube, data, count, obj_size) {
                Ok(n) => n as isize,
                Err(err) => error::map_record_error(&err) as isize,
            }
        })
    })
}

/// Receive up to `count` objects of `obj_size` bytes from one batch.
///
/// Returns the number of objects received, `0` when nothing is pending, or a
/// negative errno. Aborts the process if the tube delivers a partial object.
///
/// # Safety
/// `handle` must be a live handle; `events` must be writable for
/// `count * obj_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn tube_recv_objects(
    handle: TubeHandle,
    events: *mut c_void,
    count: usize,
    obj_size: usize,
) -> isize {
    crate::ffi_boundary(-libc::EIO as isize, || {
        with_tube(handle, -libc::EINVAL as isize, |tube| {
            let Some(len) = batch_bytes(count, obj_size) else {
                return -libc::EINVAL as isize;
            };
            // SAFETY: The caller guarantees `events` is writable for `count * obj_size` bytes.
            let Some(data) = (unsafe { bytes_arg_mut(events, len, "events") }) else {
                return -libc::EINVAL as isize;
            };
            match recv_records(tube, data, count, obj_size) {
                Ok(n) => n as isize,
                Err(err) => error::map_record_error(&err) as isize,
            }
        })
    })
}

/// Move the receive descriptor out of the tube.
///
/// On success the returned descriptor belongs to the caller (who must close
/// it) and the tube can no longer receive. Returns `-EINVAL` if the receive
/// descriptor is not open, including on a second call.
///
/// # Safety
/// `handle` must be a live handle not used concurrently from another thread.
#[no_mangle]
pub unsafe extern "C" fn tube_move_out_fd(handle: TubeHandle) -> c_int {
    crate::ffi_boundary(-libc::EIO, || {
        with_tube_mut(handle, -libc::EINVAL, |tube| {
            let mut envelope = FdEnvelope::new();
            if let Err(err) = tube.write_to_envelope(&mut envelope) {
                return error::map_transport_error(&err);
            }
            match envelope.into_inner() {
                Some(fd) => fd.into_raw_fd(),
                None => {
                    error::set_error_message("envelope lost the receive descriptor");
                    -libc::EBADF
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;
    use crate::tube_last_error;

    fn last_error() -> String {
        let ptr = tube_last_error();
        // SAFETY: tube_last_error returns a pointer to a thread-local CString.
        unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
    }

    #[test]
    fn write_then_read() {
        let handle = tube_new_default();
        unsafe {
            assert_eq!(tube_init_check(handle), 0);
            assert!(tube_get_fd(handle) >= 0);
            assert!(tube_get_send_fd(handle) >= 0);

            let msg = b"hello";
            assert_eq!(tube_write(handle, msg.as_ptr().cast(), msg.len()), 5);

            let mut buf = [0u8; 16];
            assert_eq!(tube_read(handle, buf.as_mut_ptr().cast(), buf.len()), 5);
            assert_eq!(&buf[..5], msg);
            assert_eq!(tube_read(handle, buf.as_mut_ptr().cast(), buf.len()), 0);

            tube_free(handle);
        }
    }

    #[test]
    fn objects_round_trip() {
        let handle = tube_new(16 * 1024);
        let events: Vec<u32> = (0..10).collect();
        let mut out = vec![0u32; 10];
        unsafe {
            let sent = tube_send_objects(handle, events.as_ptr().cast(), 10, 4);
            assert_eq!(sent, 10);
            let got = tube_recv_objects(handle, out.as_mut_ptr().cast(), 10, 4);
            assert_eq!(got, 10);
            tube_free(handle);
        }
        assert_eq!(out, events);
    }

    #[test]
    fn zero_object_size_is_invalid() {
        let handle = tube_new_default();
        let mut buf = [0u8; 8];
        unsafe {
            assert_eq!(
                tube_recv_objects(handle, buf.as_mut_ptr().cast(), 1, 0),
                -libc::EINVAL as isize
            );
            tube_free(handle);
        }
        assert!(last_error().contains("record size"));
    }

    #[test]
    fn move_out_revokes_and_second_move_fails() {
        let handle = tube_new_default();
        unsafe {
            let fd = tube_move_out_fd(handle);
            assert!(fd >= 0);
            assert_eq!(tube_init_check(handle), -libc::EBADF);
            assert_eq!(tube_get_fd(handle), -1);
            assert_eq!(tube_move_out_fd(handle), -libc::EINVAL);

            let receiver = tube_from_fd(fd);
            libc::close(fd);
            assert_eq!(tube_init_check(receiver), 0);
            assert_eq!(tube_get_send_fd(receiver), -1);

            let msg = [9u8; 4];
            assert_eq!(tube_write(handle, msg.as_ptr().cast(), 4), 4);
            let mut buf = [0u8; 4];
            assert_eq!(tube_read(receiver, buf.as_mut_ptr().cast(), 4), 4);
            assert_eq!(buf, msg);

            assert_eq!(
                tube_write(receiver, msg.as_ptr().cast(), 4),
                -libc::EBADF as isize
            );

            tube_free(receiver);
            tube_free(handle);
        }
    }

    #[test]
    fn negative_fd_yields_broken_tube() {
        unsafe {
            let handle = tube_from_fd(-1);
            assert!(!handle.is_null());
            assert_eq!(tube_init_check(handle), -libc::EBADF);
            assert!(tube_get_fd(handle) < 0);
            assert_eq!(tube_get_send_fd(handle), -1);
            assert_eq!(tube_move_out_fd(handle), -libc::EINVAL);
            tube_free(handle);
        }
    }

    #[test]
    fn null_handles_are_rejected() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(tube_init_check(null), -libc::EINVAL);
            assert_eq!(tube_read(null, std::ptr::null_mut(), 0), -libc::EINVAL as isize);
            tube_free(null);
        }
        assert!(last_error().contains("null"));
    }

    #[test]
    fn null_buffer_with_size_is_rejected() {
        let handle = tube_new_default();
        unsafe {
            assert_eq!(
                tube_write(handle, std::ptr::null(), 4),
                -libc::EINVAL as isize
            );
            tube_free(handle);
        }
    }
}
