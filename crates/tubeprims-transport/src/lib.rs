//! Non-blocking, record-preserving local tube.
//!
//! A [`Tube`] wraps an `AF_UNIX`/`SOCK_SEQPACKET` socket pair with small,
//! asymmetric kernel buffers. Each write is delivered as exactly one read;
//! neither side ever blocks. The receive end can be handed to another owner
//! through a capability [`Envelope`].
//!
//! This is the lowest layer of tubeprims. Record batching lives in
//! `tubeprims-records`.

pub mod config;

#[cfg(unix)]
pub mod envelope;
#[cfg(unix)]
pub mod error;
#[cfg(unix)]
pub mod naming;
#[cfg(unix)]
pub mod readiness;
#[cfg(unix)]
pub mod tube;

pub use config::{TubeConfig, DEFAULT_SOCKET_BUFFER_SIZE, REVERSE_BUFFER_SIZE};

#[cfg(unix)]
pub use envelope::{recv_envelope, send_envelope, Envelope, FdEnvelope};
#[cfg(unix)]
pub use error::{Result, TransportError};
#[cfg(unix)]
pub use naming::{AbstractSocketNamer, EndpointNamer, NoopNamer};
#[cfg(unix)]
pub use tube::{BufferSizes, Tube, TubeState};
