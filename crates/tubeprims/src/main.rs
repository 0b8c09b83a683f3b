mod cmd;
mod exit;
mod logging;
mod output;
mod stream;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tubeprims", version, about = "Local record tube diagnostics")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pump_with_buffer_size() {
        let cli = Cli::try_parse_from(["tubeprims", "pump", "--buffer-size", "8192"])
            .expect("pump args should parse");

        match cli.command {
            Command::Pump(args) => assert_eq!(args.tube.buffer_size, 8192),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_bench_with_timeout() {
        let cli = Cli::try_parse_from([
            "tubeprims",
            "--format",
            "json",
            "bench",
            "--records",
            "500",
            "--batch",
            "4",
            "--timeout",
            "750ms",
        ])
        .expect("bench args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.command, Command::Bench(_)));
    }

    #[test]
    fn rejects_unknown_output_format() {
        let err = Cli::try_parse_from(["tubeprims", "--format", "xml", "doctor"])
            .expect_err("unknown format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn rejects_zero_record_size() {
        let err = Cli::try_parse_from(["tubeprims", "pump", "--record-size", "0"])
            .expect_err("zero record size should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
