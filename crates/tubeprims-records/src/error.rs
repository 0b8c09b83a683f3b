use tubeprims_transport::TransportError;

/// Errors that can occur while sending or receiving record batches.
///
/// A transfer that splits a record is not represented here; see
/// [`crate::FramingViolation`].
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The tube refused the transfer.
    #[error("record transport error: {0}")]
    Transport(#[from] TransportError),

    /// Record size must be non-zero.
    #[error("record size must be greater than zero")]
    ZeroRecordSize,

    /// `count * record_size` does not fit in `usize`.
    #[error("batch of {count} records of {record_size} bytes overflows")]
    BatchTooLarge { count: usize, record_size: usize },

    /// The caller's buffer is shorter than `count * record_size`.
    #[error("buffer too small ({len} bytes, need {needed})")]
    BufferTooSmall { len: usize, needed: usize },
}

impl RecordError {
    /// Negative errno equivalent of this error.
    pub fn code(&self) -> i32 {
        match self {
            RecordError::Transport(err) => err.code(),
            RecordError::ZeroRecordSize
            | RecordError::BatchTooLarge { .. }
            | RecordError::BufferTooSmall { .. } => -libc::EINVAL,
        }
    }

    /// True when the kernel buffer has no room for the batch.
    pub fn is_would_block(&self) -> bool {
        matches!(self, RecordError::Transport(err) if err.is_would_block())
    }
}

pub type Result<T> = std::result::Result<T, RecordError>;
