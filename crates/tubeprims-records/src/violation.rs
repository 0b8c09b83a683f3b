use std::fmt;

/// Direction of the transfer that broke record framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "sent",
            Direction::Receive => "received",
        }
    }
}

/// Proof that a tube transfer split a record.
///
/// Seqpacket delivery makes this impossible on a healthy tube, so nothing
/// read from it afterwards can be trusted. It does not implement
/// `std::error::Error` and has no conversion into [`crate::RecordError`];
/// the only way to dispose of it is [`FramingViolation::abort`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a framing violation must be handled with `abort()`"]
pub struct FramingViolation {
    pub direction: Direction,
    pub count: usize,
    pub record_size: usize,
    pub transferred: usize,
}

impl FramingViolation {
    /// Record count for a transfer of `transferred` bytes, or the violation
    /// if it is not a whole number of records.
    ///
    /// `record_size` must be non-zero.
    pub fn check(
        direction: Direction,
        count: usize,
        record_size: usize,
        transferred: usize,
    ) -> Result<usize, FramingViolation> {
        if transferred % record_size == 0 {
            Ok(transferred / record_size)
        } else {
            Err(FramingViolation {
                direction,
                count,
                record_size,
                transferred,
            })
        }
    }

    /// Log the violation and terminate the process.
    pub fn abort(self) -> ! {
        tracing::error!(
            direction = ?self.direction,
            count = self.count,
            record_size = self.record_size,
            transferred = self.transferred,
            "{self}"
        );
        eprintln!("fatal: {self}");
        std::process::abort()
    }
}

impl fmt::Display for FramingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record framing violated (count={}, size={}, res={}): partial records were {}",
            self.count,
            self.record_size,
            self.transferred,
            self.direction.as_str()
        )
    }
}
