use serde::Serialize;
use tracing::debug;
use tubeprims_transport::{Tube, TubeConfig};

use crate::cmd::ProbeArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};

#[derive(Debug, Serialize)]
struct ProbeOutput {
    state: &'static str,
    receive_fd: i32,
    send_fd: i32,
    requested_buffer_size: usize,
    named_endpoints: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    buffers: Option<BufferOutput>,
}

#[derive(Debug, Serialize)]
struct BufferOutput {
    receive_rcvbuf: usize,
    receive_sndbuf: usize,
    send_rcvbuf: usize,
    send_sndbuf: usize,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = TubeConfig::default().with_buffer_size(args.tube.buffer_size);
    if args.name_endpoints {
        config = config.with_endpoint_names(true);
    }

    let tube = Tube::with_config(&config);
    tube.init_check()
        .map_err(|err| transport_error("create tube", err))?;
    debug!(state = tube.state().as_str(), "probed tube");

    let output = ProbeOutput {
        state: tube.state().as_str(),
        receive_fd: tube.raw_receive_fd(),
        send_fd: tube.raw_send_fd(),
        requested_buffer_size: args.tube.buffer_size,
        named_endpoints: config.name_endpoints,
        buffers: tube.buffer_sizes().map(|sizes| BufferOutput {
            receive_rcvbuf: sizes.receive_rcvbuf,
            receive_sndbuf: sizes.receive_sndbuf,
            send_rcvbuf: sizes.send_rcvbuf,
            send_sndbuf: sizes.send_sndbuf,
        }),
    };

    let mut rows = vec![
        ("state", output.state.to_string()),
        ("receive_fd", output.receive_fd.to_string()),
        ("send_fd", output.send_fd.to_string()),
        ("requested_buffer_size", output.requested_buffer_size.to_string()),
        ("named_endpoints", output.named_endpoints.to_string()),
    ];
    if let Some(buffers) = &output.buffers {
        rows.push(("receive_rcvbuf", buffers.receive_rcvbuf.to_string()));
        rows.push(("receive_sndbuf", buffers.receive_sndbuf.to_string()));
        rows.push(("send_rcvbuf", buffers.send_rcvbuf.to_string()));
        rows.push(("send_sndbuf", buffers.send_sndbuf.to_string()));
    }

    print_report("tubeprims probe", &output, &rows, output.state, format);
    Ok(SUCCESS)
}
