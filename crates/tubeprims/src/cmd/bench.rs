use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::info;
use tubeprims_records::{Record, RecordReceiver, RecordSender};
use tubeprims_transport::Tube;

use crate::cmd::{parse_duration, BenchArgs};
use crate::exit::{
    io_error, record_error, transport_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS,
    USAGE,
};
use crate::output::{print_report, OutputFormat};
use crate::stream::{receive_sequence, send_sequence, SeqRecord, SequenceError};

#[derive(Debug, Serialize)]
struct BenchOutput {
    records: u64,
    batch: usize,
    buffer_size: usize,
    elapsed_ms: f64,
    records_per_sec: f64,
    batches_received: u64,
    sender_would_block: u64,
    mean_latency_us: f64,
    max_latency_us: f64,
}

pub fn run(args: BenchArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    if args.batch.saturating_mul(SeqRecord::SIZE) > args.tube.buffer_size {
        return Err(CliError::new(
            USAGE,
            format!(
                "batch of {} records does not fit a {} byte buffer",
                args.batch, args.tube.buffer_size
            ),
        ));
    }

    let tube = Arc::new(Tube::with_buffer_size(args.tube.buffer_size));
    tube.init_check()
        .map_err(|err| transport_error("create tube", err))?;

    let started = Instant::now();
    let deadline = started + timeout;
    let (total, batch) = (args.records, args.batch);

    let producer = {
        let tube = Arc::clone(&tube);
        thread::Builder::new()
            .name("producer".into())
            .spawn(move || {
                let mut sender = RecordSender::new(tube);
                send_sequence(&mut sender, total, batch, deadline)
            })
            .map_err(|err| io_error("spawn producer", err))?
    };

    let mut receiver = RecordReceiver::new(Arc::clone(&tube));
    let received = receive_sequence(&mut receiver, total, batch, deadline);
    let elapsed = started.elapsed();

    let sent = producer
        .join()
        .map_err(|_| CliError::new(INTERNAL, "producer thread panicked"))?
        .map_err(|err| record_error("send", err))?;
    let received = match received {
        Ok(stats) => stats,
        Err(SequenceError::Record(err)) => return Err(record_error("receive", err)),
        Err(err @ SequenceError::OutOfOrder { .. }) => {
            return Err(CliError::new(DATA_INVALID, err.to_string()))
        }
    };

    let secs = elapsed.as_secs_f64();
    let output = BenchOutput {
        records: received.records,
        batch,
        buffer_size: args.tube.buffer_size,
        elapsed_ms: secs * 1_000.0,
        records_per_sec: if secs > 0.0 {
            received.records as f64 / secs
        } else {
            0.0
        },
        batches_received: received.batches,
        sender_would_block: sent.would_block,
        mean_latency_us: received.mean_latency().as_secs_f64() * 1_000_000.0,
        max_latency_us: received.max_latency.as_secs_f64() * 1_000_000.0,
    };
    info!(
        records = output.records,
        elapsed_ms = output.elapsed_ms,
        "bench complete"
    );

    let rows = [
        ("records", output.records.to_string()),
        ("batch", output.batch.to_string()),
        ("buffer_size", output.buffer_size.to_string()),
        ("elapsed_ms", format!("{:.2}", output.elapsed_ms)),
        ("records_per_sec", format!("{:.0}", output.records_per_sec)),
        ("batches_received", output.batches_received.to_string()),
        ("sender_would_block", output.sender_would_block.to_string()),
        ("mean_latency_us", format!("{:.1}", output.mean_latency_us)),
        ("max_latency_us", format!("{:.1}", output.max_latency_us)),
    ];
    let raw = format!("{:.0}", output.records_per_sec);
    print_report("tubeprims bench", &output, &rows, &raw, format);
    Ok(SUCCESS)
}
