use std::time::Duration;

use clap::builder::TypedValueParser;
use clap::{Args, Subcommand};
use tubeprims_transport::DEFAULT_SOCKET_BUFFER_SIZE;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod bench;
pub mod doctor;
pub mod handoff;
pub mod probe;
pub mod pump;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a tube and report its state, descriptors and buffer sizes.
    Probe(ProbeArgs),
    /// Fill a tube until it would block, then drain and verify it.
    Pump(PumpArgs),
    /// Stream sequenced records between two threads and report throughput.
    Bench(BenchArgs),
    /// Move a tube's receive end through an envelope and read from the copy.
    Handoff(HandoffArgs),
    /// Run local tube health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, format),
        Command::Pump(args) => pump::run(args, format),
        Command::Bench(args) => bench::run(args, format),
        Command::Handoff(args) => handoff::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct TubeArgs {
    /// Forward kernel buffer size in bytes.
    #[arg(
        long,
        env = "TUBEPRIMS_BUFFER_SIZE",
        default_value_t = DEFAULT_SOCKET_BUFFER_SIZE,
        value_parser = clap::value_parser!(u32).range(1..).map(|v| v as usize)
    )]
    pub buffer_size: usize,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub tube: TubeArgs,
    /// Bind diagnostic endpoint names regardless of TUBEPRIMS_DEBUGGABLE.
    #[arg(long)]
    pub name_endpoints: bool,
}

#[derive(Args, Debug)]
pub struct PumpArgs {
    #[command(flatten)]
    pub tube: TubeArgs,
    /// Bytes per record.
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u32).range(1..).map(|v| v as usize))]
    pub record_size: usize,
    /// Records per batch.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..).map(|v| v as usize))]
    pub batch: usize,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    #[command(flatten)]
    pub tube: TubeArgs,
    /// Total records to stream.
    #[arg(long, default_value_t = 100_000)]
    pub records: u64,
    /// Records per batch.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..).map(|v| v as usize))]
    pub batch: usize,
    /// Give up after this long (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct HandoffArgs {
    #[command(flatten)]
    pub tube: TubeArgs,
    /// Records to send through the handed-off tube.
    #[arg(long, default_value_t = 16)]
    pub records: u64,
    /// Give up after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show target and feature details.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 4 ").unwrap(), Duration::from_secs(4));
    }

    #[test]
    fn parse_duration_rejects_zero_and_garbage() {
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
