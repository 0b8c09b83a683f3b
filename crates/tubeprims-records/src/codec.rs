use bytes::BytesMut;

/// A fixed-size record that can travel through a tube.
///
/// Every encoded record must be exactly [`Record::SIZE`] bytes.
pub trait Record: Sized {
    /// Encoded size in bytes. Must be non-zero.
    const SIZE: usize;

    /// Append exactly `SIZE` bytes to `dst`.
    fn encode(&self, dst: &mut BytesMut);

    /// Decode from exactly `SIZE` bytes.
    fn decode(src: &[u8]) -> Self;
}

/// Encode `records` back to back into `dst`, replacing its contents.
pub fn encode_records<R: Record>(records: &[R], dst: &mut BytesMut) {
    dst.clear();
    dst.reserve(records.len() * R::SIZE);
    for record in records {
        let before = dst.len();
        record.encode(dst);
        debug_assert_eq!(dst.len() - before, R::SIZE, "record encoded to wrong size");
    }
}

/// Decode every whole record in `src`.
pub fn decode_records<R: Record>(src: &[u8], out: &mut Vec<R>) {
    out.extend(src.chunks_exact(R::SIZE).map(R::decode));
}
