use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `directives` (usually `RUST_LOG`) win when they parse; `level` applies
/// otherwise. Malformed directives are skipped.
fn build_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::from(level).into());
    builder.parse_lossy(directives.unwrap_or_default())
}

/// Install the stderr subscriber. Producer and consumer threads log under
/// their own names so bench and handoff output stays attributable.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, directives.as_deref()))
        .with_thread_names(true)
        .with_ansi(false)
        .with_target(false);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_the_fallback_directive() {
        let warn = build_filter(LogLevel::Warn, None).to_string();
        assert!(warn.eq_ignore_ascii_case("warn"), "{warn}");
        let trace = build_filter(LogLevel::Trace, Some("")).to_string();
        assert!(trace.eq_ignore_ascii_case("trace"), "{trace}");
    }

    #[test]
    fn env_directives_take_precedence() {
        let filter = build_filter(LogLevel::Warn, Some("tubeprims_transport=debug"));
        assert!(filter.to_string().contains("tubeprims_transport=debug"));
    }

    #[test]
    fn malformed_directives_are_skipped() {
        let filter = build_filter(LogLevel::Info, Some("tubeprims_transport=loud"));
        assert!(!filter.to_string().contains("loud"));
    }
}
