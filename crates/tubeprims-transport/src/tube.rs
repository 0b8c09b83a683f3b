use std::io::ErrorKind;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::{debug, error, warn};

use crate::config::{TubeConfig, REVERSE_BUFFER_SIZE};
use crate::envelope::Envelope;
use crate::error::{Result, TransportError};
use crate::naming::{AbstractSocketNamer, EndpointNamer};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

// MSG_TRUNC makes recv report the full message length on Linux.
#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_TRUNC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SOCKET_TYPE: libc::c_int = libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SOCKET_TYPE: libc::c_int = libc::SOCK_SEQPACKET;

/// Receive side of a tube.
#[derive(Debug)]
enum Endpoint {
    Open(OwnedFd),
    /// Construction failed with this errno.
    Failed(i32),
    /// Moved out through an envelope.
    Revoked,
}

/// Observable tube state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TubeState {
    /// Both descriptors valid, created together.
    Paired,
    /// Only the receive descriptor is valid.
    ReceiveOnly,
    /// Construction failed; no usable descriptor.
    Broken,
    /// The receive descriptor was transferred out.
    Revoked,
}

impl TubeState {
    pub fn as_str(self) -> &'static str {
        match self {
            TubeState::Paired => "paired",
            TubeState::ReceiveOnly => "receive-only",
            TubeState::Broken => "broken",
            TubeState::Revoked => "revoked",
        }
    }
}

/// Effective kernel buffer sizes of a paired tube, as reported by
/// `getsockopt`. Linux reports roughly twice the requested value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    pub receive_rcvbuf: usize,
    pub receive_sndbuf: usize,
    pub send_rcvbuf: usize,
    pub send_sndbuf: usize,
}

/// A non-blocking, record-preserving local channel.
///
/// Built on an `AF_UNIX`/`SOCK_SEQPACKET` socket pair: every `write` is
/// delivered to exactly one `read`, never merged with or split across others.
/// Neither `write` nor `read` ever blocks; use [`crate::readiness`] or an
/// external poller on [`Tube::receive_fd`] to wait for data.
///
/// A tube is always in one of the [`TubeState`]s. Construction never fails
/// outright: a failed construction yields a broken tube whose reason is
/// available through [`Tube::init_check`].
#[derive(Debug)]
pub struct Tube {
    send: Option<OwnedFd>,
    receive: Endpoint,
}

impl Tube {
    /// Create a paired tube with default 4 KiB buffers.
    pub fn new() -> Self {
        Self::with_config(&TubeConfig::default())
    }

    /// Create a paired tube with `size` bytes of forward buffering.
    pub fn with_buffer_size(size: usize) -> Self {
        Self::with_config(&TubeConfig::default().with_buffer_size(size))
    }

    /// Create a paired tube; endpoints are named when the config asks for it.
    pub fn with_config(config: &TubeConfig) -> Self {
        if config.name_endpoints {
            Self::with_namer(config, &AbstractSocketNamer)
        } else {
            Self::init(config, None)
        }
    }

    /// Create a paired tube and hand both endpoints to `namer`.
    pub fn with_namer(config: &TubeConfig, namer: &dyn EndpointNamer) -> Self {
        Self::init(config, Some(namer))
    }

    fn init(config: &TubeConfig, namer: Option<&dyn EndpointNamer>) -> Self {
        match open_pair(config) {
            Ok((receive, send)) => {
                debug!(
                    receive_fd = receive.as_raw_fd(),
                    send_fd = send.as_raw_fd(),
                    rcvbuf = config.receive_buffer_size,
                    sndbuf = config.send_buffer_size,
                    "created tube"
                );
                if let Some(namer) = namer {
                    namer.name_endpoints(receive.as_fd(), send.as_fd());
                }
                Self {
                    send: Some(send),
                    receive: Endpoint::Open(receive),
                }
            }
            Err(err) => {
                error!(%err, "tube socket pair creation failed");
                Self::broken(&err)
            }
        }
    }

    /// Create a receive-only tube by duplicating `fd`.
    pub fn from_fd(fd: BorrowedFd<'_>) -> Self {
        match fd.try_clone_to_owned() {
            Ok(receive) => {
                debug!(
                    source_fd = fd.as_raw_fd(),
                    receive_fd = receive.as_raw_fd(),
                    "created receive-only tube"
                );
                Self {
                    send: None,
                    receive: Endpoint::Open(receive),
                }
            }
            Err(err) => {
                error!(source_fd = fd.as_raw_fd(), %err, "can't duplicate tube descriptor");
                Self::broken(&err)
            }
        }
    }

    /// Create a receive-only tube from the descriptor carried by `envelope`.
    ///
    /// An empty envelope yields a broken tube (`EBADF`).
    pub fn from_envelope<E: Envelope + ?Sized>(envelope: &E) -> Self {
        match envelope.descriptor() {
            Some(fd) => Self::from_fd(fd),
            None => {
                error!("envelope carries no tube descriptor");
                Self::broken(&std::io::Error::from_raw_os_error(libc::EBADF))
            }
        }
    }

    fn broken(err: &std::io::Error) -> Self {
        Self {
            send: None,
            receive: Endpoint::Failed(err.raw_os_error().unwrap_or(libc::EIO)),
        }
    }

    /// Report whether the receive side is usable.
    pub fn init_check(&self) -> Result<()> {
        match &self.receive {
            Endpoint::Open(_) => Ok(()),
            Endpoint::Failed(errno) => Err(TransportError::Broken(
                std::io::Error::from_raw_os_error(*errno),
            )),
            Endpoint::Revoked => Err(TransportError::Revoked),
        }
    }

    /// `0` when usable, otherwise the negative errno explaining why not.
    pub fn status(&self) -> i32 {
        match self.init_check() {
            Ok(()) => 0,
            Err(err) => err.code(),
        }
    }

    pub fn state(&self) -> TubeState {
        match (&self.receive, &self.send) {
            (Endpoint::Open(_), Some(_)) => TubeState::Paired,
            (Endpoint::Open(_), None) => TubeState::ReceiveOnly,
            (Endpoint::Failed(_), _) => TubeState::Broken,
            (Endpoint::Revoked, _) => TubeState::Revoked,
        }
    }

    /// Receive descriptor, for registration with a readiness poller.
    pub fn receive_fd(&self) -> Option<BorrowedFd<'_>> {
        match &self.receive {
            Endpoint::Open(fd) => Some(fd.as_fd()),
            Endpoint::Failed(_) | Endpoint::Revoked => None,
        }
    }

    /// Send descriptor, for registration with a readiness poller.
    pub fn send_fd(&self) -> Option<BorrowedFd<'_>> {
        self.send.as_ref().map(|fd| fd.as_fd())
    }

    /// Raw receive descriptor; the negative errno when broken, `-1` when
    /// revoked.
    pub fn raw_receive_fd(&self) -> RawFd {
        match &self.receive {
            Endpoint::Open(fd) => fd.as_raw_fd(),
            Endpoint::Failed(errno) => -errno,
            Endpoint::Revoked => -1,
        }
    }

    /// Raw send descriptor, `-1` when absent.
    pub fn raw_send_fd(&self) -> RawFd {
        self.send.as_ref().map_or(-1, |fd| fd.as_raw_fd())
    }

    /// Send `buf` as one record batch without blocking.
    ///
    /// A full kernel buffer surfaces as `EAGAIN`
    /// ([`TransportError::is_would_block`]). Only `EINTR` is retried.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let fd = self.send.as_ref().ok_or(TransportError::NoSendDescriptor)?;
        loop {
            // SAFETY: `buf` is valid for `buf.len()` bytes and `fd` is an open socket.
            let len = unsafe {
                libc::send(
                    fd.as_raw_fd(),
                    buf.as_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    SEND_FLAGS,
                )
            };
            if len >= 0 {
                return Ok(len as usize);
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Io(err));
        }
    }

    /// Receive up to `buf.len()` bytes without blocking.
    ///
    /// Returns `Ok(0)` when nothing is pending. Only `EINTR` is retried.
    /// A message longer than `buf` is cut to `buf.len()` and the rest is
    /// discarded by the kernel; on Linux this is logged at warn level.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let fd = match &self.receive {
            Endpoint::Open(fd) => fd,
            Endpoint::Failed(_) | Endpoint::Revoked => {
                return Err(TransportError::NoReceiveDescriptor)
            }
        };
        loop {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes and `fd` is an open socket.
            let len = unsafe {
                libc::recv(
                    fd.as_raw_fd(),
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    RECV_FLAGS,
                )
            };
            if len >= 0 {
                let len = len as usize;
                if len > buf.len() {
                    warn!(
                        fd = fd.as_raw_fd(),
                        message_len = len,
                        buffer_len = buf.len(),
                        "record batch truncated by short receive buffer"
                    );
                    return Ok(buf.len());
                }
                return Ok(len);
            }
            let err = std::io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock => return Ok(0),
                _ => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Move the receive descriptor into `envelope`.
    ///
    /// Afterwards this tube can no longer receive and a second call fails
    /// with [`TransportError::InvalidState`]. The descriptor is released
    /// locally even if the envelope rejects it.
    pub fn write_to_envelope<E: Envelope + ?Sized>(&mut self, envelope: &mut E) -> Result<()> {
        let fd = match std::mem::replace(&mut self.receive, Endpoint::Revoked) {
            Endpoint::Open(fd) => fd,
            other => {
                self.receive = other;
                return Err(TransportError::InvalidState);
            }
        };

        let raw = fd.as_raw_fd();
        envelope.put_descriptor(fd).map_err(|err| {
            warn!(fd = raw, %err, "envelope rejected tube descriptor");
            TransportError::Envelope(err)
        })?;
        debug!(fd = raw, "transferred tube receive descriptor");
        Ok(())
    }

    /// Effective kernel buffer sizes; `None` unless paired.
    pub fn buffer_sizes(&self) -> Option<BufferSizes> {
        let receive = self.receive_fd()?;
        let send = self.send_fd()?;
        Some(BufferSizes {
            receive_rcvbuf: get_buffer_size(receive, libc::SO_RCVBUF).ok()?,
            receive_sndbuf: get_buffer_size(receive, libc::SO_SNDBUF).ok()?,
            send_rcvbuf: get_buffer_size(send, libc::SO_RCVBUF).ok()?,
            send_sndbuf: get_buffer_size(send, libc::SO_SNDBUF).ok()?,
        })
    }
}

impl Default for Tube {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Tube> for Tube {
    fn as_ref(&self) -> &Tube {
        self
    }
}

/// Create the socket pair and apply buffer sizing and non-blocking mode.
///
/// Returns `(receive, send)`.
fn open_pair(config: &TubeConfig) -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [RawFd; 2] = [-1, -1];
    // SAFETY: `fds` is a valid out-pointer for two descriptors.
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, SOCKET_TYPE, 0, fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: socketpair succeeded; both descriptors are open and owned by nobody else.
    let (receive, send) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    set_buffer_size(receive.as_fd(), libc::SO_RCVBUF, config.receive_buffer_size)?;
    set_buffer_size(send.as_fd(), libc::SO_SNDBUF, config.send_buffer_size)?;
    // The reverse direction carries no traffic.
    set_buffer_size(receive.as_fd(), libc::SO_SNDBUF, REVERSE_BUFFER_SIZE)?;
    set_buffer_size(send.as_fd(), libc::SO_RCVBUF, REVERSE_BUFFER_SIZE)?;

    set_nonblocking(receive.as_fd())?;
    set_nonblocking(send.as_fd())?;

    Ok((receive, send))
}

fn set_buffer_size(fd: BorrowedFd<'_>, option: libc::c_int, size: usize) -> std::io::Result<()> {
    let value = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
    // SAFETY: `value` is a valid c_int for the duration of the call.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            (&value as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn get_buffer_size(fd: BorrowedFd<'_>, option: libc::c_int) -> std::io::Result<usize> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: `value` and `len` are valid writable pointers for the provided sizes.
    let rc = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            (&mut value as *mut libc::c_int).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if rc == 0 {
        Ok(value.max(0) as usize)
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> std::io::Result<()> {
    // SAFETY: F_GETFL/F_SETFL only touch the status flags of an open descriptor.
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
