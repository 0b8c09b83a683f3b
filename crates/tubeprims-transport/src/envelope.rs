//! Capability envelopes: single-descriptor slots used to hand a tube's
//! receive end to another owner.
//!
//! [`Envelope`] is the only interface the tube relies on. [`FdEnvelope`] is
//! an in-process slot; [`send_envelope`] and [`recv_envelope`] carry one
//! across a process boundary as an `SCM_RIGHTS` control message over a
//! connected Unix stream.

use std::io::ErrorKind;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::net::UnixStream;

use tracing::debug;

/// A single-descriptor capability slot.
pub trait Envelope {
    /// The carried descriptor, if any. The envelope keeps ownership.
    fn descriptor(&self) -> Option<BorrowedFd<'_>>;

    /// Take ownership of `fd`. On error the descriptor is closed.
    fn put_descriptor(&mut self, fd: OwnedFd) -> std::io::Result<()>;
}

/// In-memory envelope holding at most one descriptor.
#[derive(Debug, Default)]
pub struct FdEnvelope {
    slot: Option<OwnedFd>,
}

impl FdEnvelope {
    /// Create an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an envelope already carrying `fd`.
    pub fn with_descriptor(fd: OwnedFd) -> Self {
        Self { slot: Some(fd) }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Remove the carried descriptor, leaving the envelope empty.
    pub fn take(&mut self) -> Option<OwnedFd> {
        self.slot.take()
    }

    /// Consume the envelope and return the carried descriptor.
    pub fn into_inner(self) -> Option<OwnedFd> {
        self.slot
    }
}

impl Envelope for FdEnvelope {
    fn descriptor(&self) -> Option<BorrowedFd<'_>> {
        self.slot.as_ref().map(|fd| fd.as_fd())
    }

    fn put_descriptor(&mut self, fd: OwnedFd) -> std::io::Result<()> {
        if self.slot.is_some() {
            return Err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                "envelope already carries a descriptor",
            ));
        }
        self.slot = Some(fd);
        Ok(())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const SENDMSG_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SENDMSG_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECVMSG_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECVMSG_FLAGS: libc::c_int = 0;

const MARKER_EMPTY: u8 = 0;
const MARKER_DESCRIPTOR: u8 = 1;

/// Control buffer large enough for one descriptor, aligned for `cmsghdr`.
fn control_buffer() -> Vec<u64> {
    // SAFETY: CMSG_SPACE is a pure size computation.
    let space = unsafe { libc::CMSG_SPACE(std::mem::size_of::<libc::c_int>() as libc::c_uint) };
    vec![0u64; (space as usize).div_ceil(std::mem::size_of::<u64>())]
}

/// Send `envelope` over `stream`. The local copy is closed once the kernel
/// has queued its duplicate.
pub fn send_envelope(stream: &UnixStream, envelope: FdEnvelope) -> std::io::Result<()> {
    let marker = [if envelope.is_empty() {
        MARKER_EMPTY
    } else {
        MARKER_DESCRIPTOR
    }];
    let mut iov = libc::iovec {
        iov_base: marker.as_ptr() as *mut libc::c_void,
        iov_len: marker.len(),
    };
    let mut control = control_buffer();

    // SAFETY: msghdr is plain old data; all-zero is a valid empty message.
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    if let Some(fd) = envelope.descriptor() {
        msg.msg_control = control.as_mut_ptr().cast::<libc::c_void>();
        msg.msg_controllen = (control.len() * std::mem::size_of::<u64>()) as _;
        // SAFETY: the control buffer holds CMSG_SPACE(sizeof(int)) aligned bytes,
        // so the first header and its data area are in bounds.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len =
                libc::CMSG_LEN(std::mem::size_of::<libc::c_int>() as libc::c_uint) as _;
            std::ptr::write_unaligned(libc::CMSG_DATA(cmsg).cast::<libc::c_int>(), fd.as_raw_fd());
        }
    }

    loop {
        // SAFETY: `msg` points at live iovec and control buffers for the call.
        let sent = unsafe { libc::sendmsg(stream.as_raw_fd(), &msg, SENDMSG_FLAGS) };
        if sent >= 0 {
            debug!(carries_fd = !envelope.is_empty(), "sent envelope");
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Receive one envelope from `stream` (blocking unless the stream is
/// non-blocking).
pub fn recv_envelope(stream: &UnixStream) -> std::io::Result<FdEnvelope> {
    let mut marker = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: marker.as_mut_ptr().cast::<libc::c_void>(),
        iov_len: marker.len(),
    };
    let mut control = control_buffer();

    // SAFETY: msghdr is plain old data; all-zero is a valid empty message.
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast::<libc::c_void>();
    msg.msg_controllen = (control.len() * std::mem::size_of::<u64>()) as _;

    let received = loop {
        // SAFETY: `msg` points at live, writable iovec and control buffers.
        let n = unsafe { libc::recvmsg(stream.as_raw_fd(), &mut msg, RECVMSG_FLAGS) };
        if n >= 0 {
            break n as usize;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    };

    let mut slot: Option<OwnedFd> = None;
    // SAFETY: the kernel filled `control` with well-formed headers up to
    // msg_controllen; every SCM_RIGHTS descriptor is newly installed in this
    // process and owned by nobody else.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg);
                let header = data as usize - cmsg as usize;
                let count =
                    ((*cmsg).cmsg_len as usize - header) / std::mem::size_of::<libc::c_int>();
                for i in 0..count {
                    let raw = std::ptr::read_unaligned(data.cast::<libc::c_int>().add(i));
                    let fd = OwnedFd::from_raw_fd(raw);
                    if slot.is_none() {
                        slot = Some(fd);
                    }
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    if received == 0 {
        return Err(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            "envelope stream closed",
        ));
    }
    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            "envelope control data truncated",
        ));
    }
    if marker[0] == MARKER_DESCRIPTOR && slot.is_none() {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            "envelope descriptor missing",
        ));
    }

    debug!(carries_fd = slot.is_some(), "received envelope");
    Ok(FdEnvelope { slot })
}
