/// Errors that can occur in tube operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The tube never became usable; carries the OS error from construction.
    #[error("tube is broken: {0}")]
    Broken(std::io::Error),

    /// The receive descriptor was moved out through an envelope.
    #[error("receive descriptor was transferred out")]
    Revoked,

    /// The tube has no send side (receive-only or broken).
    #[error("tube has no send descriptor")]
    NoSendDescriptor,

    /// The tube has no open receive side.
    #[error("tube has no receive descriptor")]
    NoReceiveDescriptor,

    /// The operation requires an open receive descriptor.
    #[error("invalid tube state: receive descriptor is not open")]
    InvalidState,

    /// The envelope refused the descriptor.
    #[error("envelope error: {0}")]
    Envelope(std::io::Error),

    /// An I/O error occurred on one of the tube's descriptors.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Negative errno equivalent of this error.
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Broken(err)
            | TransportError::Envelope(err)
            | TransportError::Io(err) => -err.raw_os_error().unwrap_or(libc::EIO),
            TransportError::Revoked
            | TransportError::NoSendDescriptor
            | TransportError::NoReceiveDescriptor => -libc::EBADF,
            TransportError::InvalidState => -libc::EINVAL,
        }
    }

    /// True when the kernel buffer is full (send) or empty (receive).
    pub fn is_would_block(&self) -> bool {
        matches!(self, TransportError::Io(err) if err.kind() == std::io::ErrorKind::WouldBlock)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
