use serde::Serialize;
use tracing::{debug, info};
use tubeprims_records::{recv_records, send_records};
use tubeprims_transport::Tube;

use crate::cmd::PumpArgs;
use crate::exit::{
    record_error, transport_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE,
};
use crate::output::{print_report, OutputFormat};

#[derive(Debug, Serialize)]
struct PumpOutput {
    buffer_size: usize,
    record_size: usize,
    batch: usize,
    batches_sent: u64,
    records_sent: u64,
    records_received: u64,
    errno: i32,
}

pub fn run(args: PumpArgs, format: OutputFormat) -> CliResult<i32> {
    let tube = Tube::with_buffer_size(args.tube.buffer_size);
    tube.init_check()
        .map_err(|err| transport_error("create tube", err))?;

    let batch_bytes = args
        .record_size
        .checked_mul(args.batch)
        .ok_or_else(|| CliError::new(USAGE, "batch is too large"))?;
    let outgoing: Vec<u8> = (0..batch_bytes).map(|i| (i % 251) as u8).collect();

    let mut batches_sent = 0u64;
    let full = loop {
        match send_records(&tube, &outgoing, args.batch, args.record_size) {
            Ok(_) => batches_sent += 1,
            Err(err) => break err,
        }
    };
    info!(batches = batches_sent, code = full.code(), "tube filled");

    if !full.is_would_block() {
        return Err(record_error("fill tube", full));
    }

    let mut incoming = vec![0u8; batch_bytes];
    let mut records_received = 0u64;
    loop {
        let got = recv_records(&tube, &mut incoming, args.batch, args.record_size)
            .map_err(|err| record_error("drain tube", err))?;
        if got == 0 {
            break;
        }
        if incoming[..got * args.record_size] != outgoing[..got * args.record_size] {
            return Err(CliError::new(DATA_INVALID, "drained records differ from sent"));
        }
        records_received += got as u64;
    }
    debug!(records = records_received, "tube drained");

    let records_sent = batches_sent * args.batch as u64;
    if records_received != records_sent {
        return Err(CliError::new(
            DATA_INVALID,
            format!("sent {records_sent} records but drained {records_received}"),
        ));
    }

    let output = PumpOutput {
        buffer_size: args.tube.buffer_size,
        record_size: args.record_size,
        batch: args.batch,
        batches_sent,
        records_sent,
        records_received,
        errno: full.code(),
    };
    let rows = [
        ("buffer_size", output.buffer_size.to_string()),
        ("record_size", output.record_size.to_string()),
        ("batch", output.batch.to_string()),
        ("batches_sent", output.batches_sent.to_string()),
        ("records_sent", output.records_sent.to_string()),
        ("records_received", output.records_received.to_string()),
        ("full_errno", output.errno.to_string()),
    ];
    let raw = output.records_received.to_string();
    print_report("tubeprims pump", &output, &rows, &raw, format);
    Ok(SUCCESS)
}
