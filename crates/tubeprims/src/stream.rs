//! Sequenced test records shared by the pump, bench and handoff commands.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};
use tubeprims_records::{Record, RecordError, RecordReceiver, RecordSender};
use tubeprims_transport::readiness::{wait_readable, wait_writable};
use tubeprims_transport::{TransportError, Tube};

/// One sequenced record: a counter and the send time in nanoseconds since
/// the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRecord {
    pub seq: u64,
    pub sent_ns: u64,
}

impl SeqRecord {
    pub fn now(seq: u64) -> Self {
        Self {
            seq,
            sent_ns: now_ns(),
        }
    }

    pub fn age(&self) -> Duration {
        Duration::from_nanos(now_ns().saturating_sub(self.sent_ns))
    }
}

impl Record for SeqRecord {
    const SIZE: usize = 16;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u64_le(self.seq);
        dst.put_u64_le(self.sent_ns);
    }

    fn decode(mut src: &[u8]) -> Self {
        Self {
            seq: src.get_u64_le(),
            sent_ns: src.get_u64_le(),
        }
    }
}

pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Outcome of a bounded stream transfer.
#[derive(Debug, Default, Clone)]
pub struct StreamStats {
    pub records: u64,
    pub batches: u64,
    pub would_block: u64,
    pub max_latency: Duration,
    pub total_latency: Duration,
}

impl StreamStats {
    pub fn mean_latency(&self) -> Duration {
        if self.records == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total_latency.as_nanos() / self.records as u128) as u64)
    }
}

fn timed_out() -> RecordError {
    RecordError::Transport(TransportError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "stream deadline exceeded",
    )))
}

/// Send `total` sequenced records in batches of `batch`, waiting for
/// writability whenever the tube is full.
pub fn send_sequence<T: AsRef<Tube>>(
    sender: &mut RecordSender<T>,
    total: u64,
    batch: usize,
    deadline: Instant,
) -> Result<StreamStats, RecordError> {
    let mut stats = StreamStats::default();
    let mut next = 0u64;
    let mut pending = Vec::with_capacity(batch);

    while next < total {
        if pending.is_empty() {
            let end = (next + batch as u64).min(total);
            pending.extend((next..end).map(SeqRecord::now));
        }

        match sender.send(&pending) {
            Ok(sent) => {
                next += sent as u64;
                stats.records += sent as u64;
                stats.batches += 1;
                pending.clear();
            }
            Err(err) if err.is_would_block() => {
                stats.would_block += 1;
                let tube: &Tube = sender.get_ref().as_ref();
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(timed_out());
                }
                if let Some(fd) = tube.send_fd() {
                    wait_writable(fd, Some(remaining))
                        .map_err(|e| RecordError::Transport(TransportError::Io(e)))?;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Ok(stats)
}

/// Receive until `total` records have arrived, checking that sequence
/// numbers are contiguous from zero.
pub fn receive_sequence<T: AsRef<Tube>>(
    receiver: &mut RecordReceiver<T>,
    total: u64,
    batch: usize,
    deadline: Instant,
) -> Result<StreamStats, SequenceError> {
    let mut stats = StreamStats::default();
    let mut records: Vec<SeqRecord> = Vec::with_capacity(batch);

    while stats.records < total {
        records.clear();
        let got = receiver.recv_into(&mut records, batch)?;
        if got == 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out().into());
            }
            let tube: &Tube = receiver.get_ref().as_ref();
            if let Some(fd) = tube.receive_fd() {
                wait_readable(fd, Some(remaining))
                    .map_err(|e| RecordError::Transport(TransportError::Io(e)))?;
            }
            continue;
        }

        stats.batches += 1;
        for record in &records {
            if record.seq != stats.records {
                return Err(SequenceError::OutOfOrder {
                    expected: stats.records,
                    got: record.seq,
                });
            }
            let age = record.age();
            stats.max_latency = stats.max_latency.max(age);
            stats.total_latency += age;
            stats.records += 1;
        }
    }

    Ok(stats)
}

/// Failure while receiving a sequenced stream.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error(transparent)]
    Record(#[from] RecordError),

    /// A record arrived out of order or a record was lost.
    #[error("expected record {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn seq_record_is_sixteen_bytes() {
        let mut buf = BytesMut::new();
        SeqRecord { seq: 7, sent_ns: 9 }.encode(&mut buf);
        assert_eq!(buf.len(), SeqRecord::SIZE);
        assert_eq!(SeqRecord::decode(&buf), SeqRecord { seq: 7, sent_ns: 9 });
    }

    #[test]
    fn sequence_survives_a_full_buffer() {
        let tube = Arc::new(Tube::new());
        let deadline = Instant::now() + Duration::from_secs(10);

        let producer = {
            let tube = Arc::clone(&tube);
            thread::spawn(move || {
                let mut sender = RecordSender::new(tube);
                send_sequence(&mut sender, 2_000, 8, deadline).expect("send sequence")
            })
        };

        let mut receiver = RecordReceiver::new(Arc::clone(&tube));
        let received = receive_sequence(&mut receiver, 2_000, 8, deadline).expect("receive");
        let sent = producer.join().expect("producer thread");

        assert_eq!(sent.records, 2_000);
        assert_eq!(received.records, 2_000);
    }

    #[test]
    fn gap_in_sequence_is_reported() {
        let tube = Tube::new();
        let mut sender = RecordSender::new(&tube);
        sender.send(&[SeqRecord::now(0), SeqRecord::now(2)]).unwrap();

        let mut receiver = RecordReceiver::new(&tube);
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = receive_sequence(&mut receiver, 3, 2, deadline).expect_err("gap");

        assert!(matches!(err, SequenceError::OutOfOrder { expected: 1, got: 2 }));
        assert_eq!(err.to_string(), "expected record 1, got 2");
    }

    #[test]
    fn record_errors_convert_and_display() {
        let err: SequenceError = RecordError::ZeroRecordSize.into();
        assert_eq!(err.to_string(), RecordError::ZeroRecordSize.to_string());
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn receive_times_out_on_silent_tube() {
        let tube = Tube::new();
        let mut receiver = RecordReceiver::new(&tube);
        let deadline = Instant::now() + Duration::from_millis(50);

        let err = receive_sequence(&mut receiver, 1, 1, deadline).expect_err("should time out");
        match err {
            SequenceError::Record(RecordError::Transport(TransportError::Io(io))) => {
                assert_eq!(io.kind(), std::io::ErrorKind::TimedOut)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
