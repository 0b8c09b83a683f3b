#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn tubeprims(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tubeprims"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .env_remove("TUBEPRIMS_BUFFER_SIZE")
        .output()
        .expect("tubeprims should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn doctor_reports_passing_checks() {
    let output = tubeprims(&["doctor"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    assert!(text.contains("\"overall\":\"pass\""));
    assert!(text.contains("\"name\":\"record_boundaries\",\"status\":\"pass\""));
    assert!(text.contains("\"name\":\"envelope_transfer\",\"status\":\"pass\""));
}

#[test]
fn probe_reports_paired_tube() {
    let output = tubeprims(&["probe", "--buffer-size", "8192"]);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("\"state\":\"paired\""));
    assert!(text.contains("\"requested_buffer_size\":8192"));
    assert!(text.contains("\"receive_rcvbuf\""));
}

#[test]
fn probe_reads_buffer_size_from_env() {
    let output = Command::new(env!("CARGO_BIN_EXE_tubeprims"))
        .args(["--format", "json", "probe"])
        .env("TUBEPRIMS_BUFFER_SIZE", "16384")
        .output()
        .expect("tubeprims should run");
    assert!(output.status.success());
    assert!(stdout(&output).contains("\"requested_buffer_size\":16384"));
}

#[test]
fn pump_fills_until_would_block_and_drains_everything() {
    let output = tubeprims(&["pump", "--record-size", "32", "--batch", "2"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    assert!(text.contains("\"errno\":-"));
    assert!(!text.contains("\"records_sent\":0,"));
}

#[test]
fn pump_rejects_batch_larger_than_buffer() {
    let output = tubeprims(&[
        "pump",
        "--buffer-size",
        "4096",
        "--record-size",
        "4096",
        "--batch",
        "64",
    ]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn handoff_moves_receive_end_and_delivers_records() {
    let output = tubeprims(&["handoff", "--records", "64"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    assert!(text.contains("\"source_state\":\"revoked\""));
    assert!(text.contains("\"second_transfer_rejected\":true"));
    assert!(text.contains("\"received_state\":\"receive-only\""));
    assert!(text.contains("\"records\":64"));
}

#[test]
fn bench_streams_all_records() {
    let output = tubeprims(&["bench", "--records", "5000", "--batch", "4", "--timeout", "20s"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("\"records\":5000"));
}

#[test]
fn bench_rejects_invalid_timeout() {
    let output = tubeprims(&["bench", "--timeout", "never"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = tubeprims(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}
