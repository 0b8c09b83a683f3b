use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use serde::Serialize;
use tubeprims_transport::config::debuggable;
use tubeprims_transport::{
    recv_envelope, send_envelope, FdEnvelope, Tube, TubeState, DEFAULT_SOCKET_BUFFER_SIZE,
};

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Pass,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Fail,
            detail: detail.into(),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Info,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        seqpacket_pair_check(),
        nonblocking_empty_read_check(),
        record_boundaries_check(),
        asymmetric_buffers_check(),
        envelope_transfer_check(),
        endpoint_naming_check(),
        compiled_features_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };
    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => crate::output::print_json(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("tubeprims doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => println!("{}", output.overall),
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
    }
}

fn seqpacket_pair_check() -> CheckResult {
    let tube = Tube::new();
    match tube.init_check() {
        Ok(()) if tube.state() == TubeState::Paired => CheckResult::pass(
            "seqpacket_pair",
            format!(
                "receive fd {} send fd {}",
                tube.raw_receive_fd(),
                tube.raw_send_fd()
            ),
        ),
        Ok(()) => CheckResult::fail("seqpacket_pair", format!("state {}", tube.state().as_str())),
        Err(err) => CheckResult::fail("seqpacket_pair", err.to_string()),
    }
}

fn nonblocking_empty_read_check() -> CheckResult {
    let tube = Tube::new();
    let mut buf = [0u8; 16];
    let started = Instant::now();
    match tube.read(&mut buf) {
        Ok(0) if started.elapsed() < Duration::from_millis(100) => {
            CheckResult::pass("nonblocking_empty_read", "empty read returned immediately")
        }
        Ok(n) => CheckResult::fail("nonblocking_empty_read", format!("empty read returned {n}")),
        Err(err) => CheckResult::fail("nonblocking_empty_read", err.to_string()),
    }
}

fn record_boundaries_check() -> CheckResult {
    let tube = Tube::new();
    let writes: [&[u8]; 3] = [b"a", b"bcd", b"ef"];
    for payload in writes {
        if let Err(err) = tube.write(payload) {
            return CheckResult::fail("record_boundaries", err.to_string());
        }
    }

    let mut buf = [0u8; 64];
    for payload in writes {
        match tube.read(&mut buf) {
            Ok(n) if &buf[..n] == payload => {}
            Ok(n) => {
                return CheckResult::fail(
                    "record_boundaries",
                    format!("expected {} bytes, read {n}", payload.len()),
                )
            }
            Err(err) => return CheckResult::fail("record_boundaries", err.to_string()),
        }
    }
    CheckResult::pass("record_boundaries", "3 writes read back as 3 records")
}

fn asymmetric_buffers_check() -> CheckResult {
    let requested = DEFAULT_SOCKET_BUFFER_SIZE * 4;
    let tube = Tube::with_buffer_size(requested);
    let Some(sizes) = tube.buffer_sizes() else {
        return CheckResult::fail("asymmetric_buffers", "buffer sizes unavailable");
    };

    let detail = format!(
        "receive rcv={} snd={}, send rcv={} snd={}",
        sizes.receive_rcvbuf, sizes.receive_sndbuf, sizes.send_rcvbuf, sizes.send_sndbuf
    );
    if sizes.receive_rcvbuf > sizes.receive_sndbuf && sizes.send_sndbuf > sizes.send_rcvbuf {
        CheckResult::pass("asymmetric_buffers", detail)
    } else {
        CheckResult::info("asymmetric_buffers", format!("kernel clamped sizes: {detail}"))
    }
}

fn envelope_transfer_check() -> CheckResult {
    let mut tube = Tube::new();
    let mut envelope = FdEnvelope::new();
    if let Err(err) = tube.write_to_envelope(&mut envelope) {
        return CheckResult::fail("envelope_transfer", err.to_string());
    }

    let delivered = UnixStream::pair().and_then(|(local, remote)| {
        send_envelope(&local, envelope)?;
        recv_envelope(&remote)
    });
    let delivered = match delivered {
        Ok(envelope) => envelope,
        Err(err) => return CheckResult::fail("envelope_transfer", err.to_string()),
    };

    let receiving = Tube::from_envelope(&delivered);
    if let Err(err) = tube.write(b"ping") {
        return CheckResult::fail("envelope_transfer", err.to_string());
    }
    let mut buf = [0u8; 8];
    match receiving.read(&mut buf) {
        Ok(4) if &buf[..4] == b"ping" => {
            CheckResult::pass("envelope_transfer", "receive end delivered over SCM_RIGHTS")
        }
        Ok(n) => CheckResult::fail("envelope_transfer", format!("read {n} bytes")),
        Err(err) => CheckResult::fail("envelope_transfer", err.to_string()),
    }
}

fn endpoint_naming_check() -> CheckResult {
    CheckResult::info(
        "endpoint_naming",
        if debuggable() {
            "enabled (TUBEPRIMS_DEBUGGABLE=1)"
        } else {
            "disabled"
        },
    )
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "cli") {
        features.push("cli");
    }
    if cfg!(any(target_os = "linux", target_os = "android")) {
        features.push("abstract-names");
    }
    CheckResult::info("compiled_features", features.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_checks_pass() {
        assert!(matches!(seqpacket_pair_check().status, CheckStatus::Pass));
        assert!(matches!(
            nonblocking_empty_read_check().status,
            CheckStatus::Pass
        ));
        assert!(matches!(record_boundaries_check().status, CheckStatus::Pass));
        assert!(matches!(envelope_transfer_check().status, CheckStatus::Pass));
    }
}
