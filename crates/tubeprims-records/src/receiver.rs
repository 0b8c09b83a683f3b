use tubeprims_transport::Tube;

use crate::codec::{decode_records, Record};
use crate::error::{RecordError, Result};
use crate::marshal::recv_records;

/// Receives typed record batches from a tube without blocking.
pub struct RecordReceiver<T> {
    inner: T,
    buf: Vec<u8>,
}

impl<T: AsRef<Tube>> RecordReceiver<T> {
    /// Create a receiver over `inner` (a `Tube`, `&Tube` or `Arc<Tube>`).
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Receive one pending batch of at most `max` records.
    ///
    /// Returns an empty vector when nothing is pending. `max` must be at
    /// least the sender's batch size; the kernel discards the rest of a
    /// larger batch.
    pub fn recv<R: Record>(&mut self, max: usize) -> Result<Vec<R>> {
        let mut out = Vec::new();
        self.recv_into(&mut out, max)?;
        Ok(out)
    }

    /// Like [`RecordReceiver::recv`], appending to `out`. Returns the number
    /// of records appended.
    pub fn recv_into<R: Record>(&mut self, out: &mut Vec<R>, max: usize) -> Result<usize> {
        let needed = max
            .checked_mul(R::SIZE)
            .filter(|&len| len <= isize::MAX as usize)
            .ok_or(RecordError::BatchTooLarge {
                count: max,
                record_size: R::SIZE,
            })?;
        if self.buf.len() < needed {
            self.buf.resize(needed, 0);
        }
        let count = recv_records(self.inner.as_ref(), &mut self.buf, max, R::SIZE)?;
        decode_records(&self.buf[..count * R::SIZE], out);
        Ok(count)
    }

    /// Borrow the underlying tube handle.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the receiver and return the tube handle.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
