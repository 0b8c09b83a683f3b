use tubeprims_transport::Tube;

use crate::error::{RecordError, Result};
use crate::violation::{Direction, FramingViolation};

/// Byte length of a `count`-record batch, validated against `available`.
fn batch_len(count: usize, record_size: usize, available: usize) -> Result<usize> {
    if record_size == 0 {
        return Err(RecordError::ZeroRecordSize);
    }
    let needed = count
        .checked_mul(record_size)
        .ok_or(RecordError::BatchTooLarge { count, record_size })?;
    if available < needed {
        return Err(RecordError::BufferTooSmall {
            len: available,
            needed,
        });
    }
    Ok(needed)
}

/// Send the first `count` records of `records` in a single tube write.
///
/// Returns the number of records sent. A kernel buffer without room for the
/// whole batch fails with `EAGAIN`; nothing is sent in that case.
///
/// Aborts the process if the tube reports a partial record.
pub fn send_records(tube: &Tube, records: &[u8], count: usize, record_size: usize) -> Result<usize> {
    let len = batch_len(count, record_size, records.len())?;
    let sent = tube.write(&records[..len])?;
    Ok(FramingViolation::check(Direction::Send, count, record_size, sent)
        .unwrap_or_else(|violation| violation.abort()))
}

/// Receive up to `count` records into `buffer` in a single tube read.
///
/// Returns the number of records received; `0` when nothing is pending.
/// `buffer` must hold at least `count * record_size` bytes, and `count`
/// must cover the largest batch the sender writes or the excess is
/// discarded by the kernel.
///
/// Aborts the process if the tube delivers a partial record.
pub fn recv_records(
    tube: &Tube,
    buffer: &mut [u8],
    count: usize,
    record_size: usize,
) -> Result<usize> {
    let len = batch_len(count, record_size, buffer.len())?;
    let received = tube.read(&mut buffer[..len])?;
    Ok(
        FramingViolation::check(Direction::Receive, count, record_size, received)
            .unwrap_or_else(|violation| violation.abort()),
    )
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tubeprims_transport::{TransportError, TubeConfig};

    use super::*;

    fn quiet_tube(size: usize) -> Tube {
        Tube::with_config(
            &TubeConfig::default()
                .with_buffer_size(size)
                .with_endpoint_names(false),
        )
    }

    #[test]
    fn batch_round_trip() {
        let tube = quiet_tube(4096);
        let records: Vec<u8> = (0u8..48).collect();

        assert_eq!(send_records(&tube, &records, 4, 12).unwrap(), 4);

        let mut buf = vec![0u8; 48];
        assert_eq!(recv_records(&tube, &mut buf, 4, 12).unwrap(), 4);
        assert_eq!(buf, records);
    }

    #[test]
    fn batches_are_not_coalesced() {
        let tube = quiet_tube(4096);
        send_records(&tube, &[1u8; 8], 1, 8).unwrap();
        send_records(&tube, &[2u8; 16], 2, 8).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(recv_records(&tube, &mut buf, 8, 8).unwrap(), 1);
        assert_eq!(&buf[..8], &[1u8; 8]);
        assert_eq!(recv_records(&tube, &mut buf, 8, 8).unwrap(), 2);
        assert_eq!(&buf[..16], &[2u8; 16]);
        assert_eq!(recv_records(&tube, &mut buf, 8, 8).unwrap(), 0);
    }

    #[test]
    fn only_count_records_are_sent() {
        let tube = quiet_tube(4096);
        let records = [7u8; 40];
        assert_eq!(send_records(&tube, &records, 2, 10).unwrap(), 2);

        let mut buf = [0u8; 40];
        assert_eq!(recv_records(&tube, &mut buf, 4, 10).unwrap(), 2);
    }

    #[test]
    fn empty_tube_receives_nothing() {
        let tube = quiet_tube(4096);
        let mut buf = [0u8; 32];
        assert_eq!(recv_records(&tube, &mut buf, 4, 8).unwrap(), 0);
    }

    #[test]
    fn zero_count_is_an_empty_batch() {
        let tube = quiet_tube(4096);
        assert_eq!(send_records(&tube, &[], 0, 16).unwrap(), 0);
        let mut buf = [0u8; 16];
        assert_eq!(recv_records(&tube, &mut buf, 1, 16).unwrap(), 0);
    }

    #[test]
    fn caller_errors_are_rejected_before_io() {
        let tube = quiet_tube(4096);
        assert!(matches!(
            send_records(&tube, &[0u8; 8], 1, 0),
            Err(RecordError::ZeroRecordSize)
        ));
        assert!(matches!(
            send_records(&tube, &[0u8; 8], usize::MAX, 2),
            Err(RecordError::BatchTooLarge { .. })
        ));
        let err = recv_records(&tube, &mut [0u8; 8], 2, 8).unwrap_err();
        assert!(matches!(err, RecordError::BufferTooSmall { len: 8, needed: 16 }));
        assert_eq!(err.code(), -libc::EINVAL);

        let mut buf = [0u8; 8];
        assert_eq!(tube.read(&mut buf).unwrap(), 0, "nothing should have been sent");
    }

    #[test]
    fn full_tube_reports_would_block() {
        let tube = quiet_tube(4096);
        let records = [0u8; 128];
        let err = loop {
            match send_records(&tube, &records, 4, 32) {
                Ok(n) => assert_eq!(n, 4),
                Err(err) => break err,
            }
        };
        assert!(err.is_would_block(), "unexpected error: {err}");
        assert_eq!(err.code(), -libc::EAGAIN);
    }

    #[test]
    fn transport_errors_pass_through() {
        let receiver = Tube::from_fd(quiet_tube(4096).receive_fd().unwrap());
        let err = send_records(&receiver, &[0u8; 8], 1, 8).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Transport(TransportError::NoSendDescriptor)
        ));
        assert_eq!(err.code(), -libc::EBADF);
    }

    proptest! {
        #[test]
        fn records_survive_the_tube(
            record_size in 1usize..64,
            count in 0usize..32,
            seed in any::<u8>(),
        ) {
            let tube = quiet_tube(64 * 1024);
            let records: Vec<u8> = (0..count * record_size)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();

            prop_assert_eq!(send_records(&tube, &records, count, record_size).unwrap(), count);

            let mut buf = vec![0u8; count * record_size];
            prop_assert_eq!(recv_records(&tube, &mut buf, count, record_size).unwrap(), count);
            prop_assert_eq!(buf, records);
        }
    }
}
