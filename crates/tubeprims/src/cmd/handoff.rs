use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use tubeprims_records::{RecordReceiver, RecordSender};
use tubeprims_transport::{recv_envelope, send_envelope, FdEnvelope, TransportError, Tube};

use crate::cmd::{parse_duration, HandoffArgs};
use crate::exit::{
    io_error, record_error, transport_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS,
};
use crate::output::{print_report, OutputFormat};
use crate::stream::{receive_sequence, send_sequence, SequenceError};

#[derive(Debug, Serialize)]
struct HandoffOutput {
    source_state: &'static str,
    second_transfer_rejected: bool,
    received_state: &'static str,
    received_fd: i32,
    records: u64,
}

pub fn run(args: HandoffArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let deadline = Instant::now() + timeout;

    let mut tube = Tube::with_buffer_size(args.tube.buffer_size);
    tube.init_check()
        .map_err(|err| transport_error("create tube", err))?;

    let mut envelope = FdEnvelope::new();
    tube.write_to_envelope(&mut envelope)
        .map_err(|err| transport_error("move receive end", err))?;

    let mut spare = FdEnvelope::new();
    let second_transfer_rejected = matches!(
        tube.write_to_envelope(&mut spare),
        Err(TransportError::InvalidState)
    );

    let (local, remote) = UnixStream::pair().map_err(|err| io_error("carrier pair", err))?;
    send_envelope(&local, envelope).map_err(|err| io_error("send envelope", err))?;

    let total = args.records;
    let consumer = thread::Builder::new()
        .name("consumer".into())
        .spawn(move || {
            let delivered = recv_envelope(&remote)?;
            let receiving = Tube::from_envelope(&delivered);
            debug!(state = receiving.state().as_str(), "consumer rebuilt tube");
            Ok::<_, std::io::Error>(receiving)
        })
        .map_err(|err| io_error("spawn consumer", err))?;

    let receiving = consumer
        .join()
        .map_err(|_| CliError::new(INTERNAL, "consumer thread panicked"))?
        .map_err(|err| io_error("receive envelope", err))?;
    receiving
        .init_check()
        .map_err(|err| transport_error("rebuild tube", err))?;

    let (sent, received) = thread::scope(|scope| {
        let producer = scope.spawn(|| {
            let mut sender = RecordSender::new(&tube);
            send_sequence(&mut sender, total, 1, deadline)
        });
        let mut receiver = RecordReceiver::new(&receiving);
        let received = receive_sequence(&mut receiver, total, 1, deadline);
        (producer.join(), received)
    });
    sent.map_err(|_| CliError::new(INTERNAL, "producer thread panicked"))?
        .map_err(|err| record_error("send", err))?;

    let stats = match received {
        Ok(stats) => stats,
        Err(SequenceError::Record(err)) => return Err(record_error("receive", err)),
        Err(err @ SequenceError::OutOfOrder { .. }) => {
            return Err(CliError::new(DATA_INVALID, err.to_string()))
        }
    };

    let output = HandoffOutput {
        source_state: tube.state().as_str(),
        second_transfer_rejected,
        received_state: receiving.state().as_str(),
        received_fd: receiving.raw_receive_fd(),
        records: stats.records,
    };
    let rows = [
        ("source_state", output.source_state.to_string()),
        (
            "second_transfer_rejected",
            output.second_transfer_rejected.to_string(),
        ),
        ("received_state", output.received_state.to_string()),
        ("received_fd", output.received_fd.to_string()),
        ("records", output.records.to_string()),
    ];
    let raw = output.records.to_string();
    print_report("tubeprims handoff", &output, &rows, &raw, format);
    Ok(SUCCESS)
}
