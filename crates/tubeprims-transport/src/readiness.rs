//! Caller-side readiness waiting for tube descriptors.
//!
//! Tube I/O never blocks. Consumers that want to sleep until a record
//! arrives poll the descriptor from [`crate::Tube::receive_fd`] here (or
//! register it with their own event loop).

use std::io::ErrorKind;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::{Duration, Instant};

/// Wait until `fd` is readable (or hung up). `None` waits indefinitely.
///
/// Returns `Ok(false)` on timeout.
pub fn wait_readable(fd: BorrowedFd<'_>, timeout: Option<Duration>) -> std::io::Result<bool> {
    wait_for(fd, libc::POLLIN, timeout)
}

/// Wait until `fd` has room for another write. `None` waits indefinitely.
///
/// Returns `Ok(false)` on timeout.
pub fn wait_writable(fd: BorrowedFd<'_>, timeout: Option<Duration>) -> std::io::Result<bool> {
    wait_for(fd, libc::POLLOUT, timeout)
}

fn wait_for(
    fd: BorrowedFd<'_>,
    events: libc::c_short,
    timeout: Option<Duration>,
) -> std::io::Result<bool> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let timeout_ms = match deadline {
            None => -1,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                // Round up so a sub-millisecond remainder still sleeps.
                let ms = remaining.as_micros().div_ceil(1000);
                libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
            }
        };

        let mut pfd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events,
            revents: 0,
        };
        // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc > 0 {
            return Ok(pfd.revents & (events | libc::POLLHUP | libc::POLLERR) != 0);
        }
        if rc == 0 {
            return Ok(false);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
