//! Diagnostic naming of tube endpoints.
//!
//! A freshly created socket pair is anonymous, which makes it hard to tell
//! tubes apart in `ss -x` or `/proc/<pid>/net/unix`. When enabled, each
//! endpoint is bound to an abstract `AF_UNIX` name built from the owning
//! process, thread and descriptor number. Naming never affects tube validity.

use std::os::fd::{AsRawFd, BorrowedFd};

#[cfg(any(target_os = "linux", target_os = "android"))]
use tracing::debug;

/// Longest name that fits `sun_path` after the leading NUL of an abstract
/// address, minus one byte of slack.
pub const MAX_ENDPOINT_NAME_LEN: usize = 106;

/// Hook invoked once after a tube's socket pair has been created.
///
/// Implementations must swallow their own failures.
pub trait EndpointNamer {
    fn name_endpoints(&self, receive: BorrowedFd<'_>, send: BorrowedFd<'_>);
}

/// Leaves endpoints anonymous.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNamer;

impl EndpointNamer for NoopNamer {
    fn name_endpoints(&self, _receive: BorrowedFd<'_>, _send: BorrowedFd<'_>) {}
}

/// Binds each endpoint to `"{process}-{thread}-f{fd}"` in the abstract
/// namespace (Linux/Android only; a no-op elsewhere).
#[derive(Debug, Default, Clone, Copy)]
pub struct AbstractSocketNamer;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl EndpointNamer for AbstractSocketNamer {
    fn name_endpoints(&self, receive: BorrowedFd<'_>, send: BorrowedFd<'_>) {
        let pid = std::process::id();
        let tid = current_thread_id();
        let process = comm_name(pid).unwrap_or_else(|| format!("t{pid}"));
        let thread = comm_name(tid).unwrap_or_else(|| format!("t{tid}"));

        for fd in [receive, send] {
            let name = endpoint_name(&process, &thread, fd.as_raw_fd());
            match bind_abstract(fd, &name) {
                Ok(()) => debug!(fd = fd.as_raw_fd(), %name, "named tube endpoint"),
                Err(err) => debug!(fd = fd.as_raw_fd(), %err, "tube endpoint naming failed"),
            }
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl EndpointNamer for AbstractSocketNamer {
    fn name_endpoints(&self, _receive: BorrowedFd<'_>, _send: BorrowedFd<'_>) {}
}

/// Build the diagnostic name for one endpoint, truncated to
/// [`MAX_ENDPOINT_NAME_LEN`] bytes on a character boundary.
pub fn endpoint_name(process: &str, thread: &str, fd: i32) -> String {
    let mut name = format!("{process}-{thread}-f{fd}");
    if name.len() > MAX_ENDPOINT_NAME_LEN {
        let mut cut = MAX_ENDPOINT_NAME_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn current_thread_id() -> u32 {
    // SAFETY: gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn comm_name(id: u32) -> Option<String> {
    let comm = std::fs::read_to_string(format!("/proc/{id}/comm")).ok()?;
    let comm = comm.trim_end_matches('\n');
    if comm.is_empty() {
        None
    } else {
        Some(comm.to_string())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_abstract(fd: BorrowedFd<'_>, name: &str) -> std::io::Result<()> {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    // sun_path[0] stays NUL: abstract namespace.
    let bytes = name.as_bytes();
    let max = addr.sun_path.len() - 1;
    let used = bytes.len().min(max);
    for (dst, src) in addr.sun_path[1..].iter_mut().zip(&bytes[..used]) {
        *dst = *src as libc::c_char;
    }

    let len = std::mem::size_of::<libc::sa_family_t>() + 1 + used;

    // SAFETY: `addr` is a valid sockaddr_un and `len` does not exceed its size.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
            len as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_has_process_thread_and_fd() {
        assert_eq!(endpoint_name("surfaceflinger", "t812", 17), "surfaceflinger-t812-f17");
    }

    #[test]
    fn long_names_are_truncated() {
        let process = "p".repeat(80);
        let thread = "t".repeat(80);
        let name = endpoint_name(&process, &thread, 3);
        assert_eq!(name.len(), MAX_ENDPOINT_NAME_LEN);
        assert!(name.starts_with(&process));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let process = "é".repeat(60);
        let name = endpoint_name(&process, "t", 3);
        assert!(name.len() <= MAX_ENDPOINT_NAME_LEN);
        assert!(name.chars().all(|c| c == 'é'));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn abstract_namer_binds_both_endpoints() {
        use crate::{Tube, TubeConfig};

        let tube = Tube::with_namer(&TubeConfig::default(), &AbstractSocketNamer);
        tube.init_check().unwrap();

        for fd in [tube.receive_fd().unwrap(), tube.send_fd().unwrap()] {
            let name = bound_name(fd);
            let suffix = format!("-f{}", fd.as_raw_fd());
            assert!(name.ends_with(&suffix), "unexpected name {name:?}");
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn bound_name(fd: BorrowedFd<'_>) -> String {
        // SAFETY: zeroed sockaddr_un is valid; getsockname writes at most `len` bytes.
        let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockname(
                fd.as_raw_fd(),
                (&mut addr as *mut libc::sockaddr_un).cast::<libc::sockaddr>(),
                &mut len,
            )
        };
        assert_eq!(rc, 0);
        let path_len = len as usize - std::mem::size_of::<libc::sa_family_t>();
        assert!(path_len > 1, "endpoint is still anonymous");
        addr.sun_path[1..path_len]
            .iter()
            .map(|&c| c as u8 as char)
            .collect()
    }
}
