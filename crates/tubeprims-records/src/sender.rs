use bytes::BytesMut;
use tubeprims_transport::Tube;

use crate::codec::{encode_records, Record};
use crate::error::Result;
use crate::marshal::send_records;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Sends typed record batches over a tube, one write per batch.
pub struct RecordSender<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: AsRef<Tube>> RecordSender<T> {
    /// Create a sender over `inner` (a `Tube`, `&Tube` or `Arc<Tube>`).
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode `records` and send them as a single batch.
    ///
    /// Returns the number of records sent, which is always `records.len()`
    /// on success. A full tube fails with `EAGAIN` and sends nothing.
    pub fn send<R: Record>(&mut self, records: &[R]) -> Result<usize> {
        encode_records(records, &mut self.buf);
        send_records(self.inner.as_ref(), &self.buf, records.len(), R::SIZE)
    }

    /// Borrow the underlying tube handle.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the sender and return the tube handle.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
