//! Logging arguments and subscriber setup shared by every subcommand.

/// Log configuration. All diagnostics go to stderr so report output on
/// stdout stays machine-readable.
#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// The log verbosity. Can be one of trace|debug|info|warn|error|off
    #[arg(
        long = "log.level",
        default_value_t = LogLevel::Warn,
        group = "logging",
        ignore_case = true,
        value_enum,
        global = true
    )]
    pub level: LogLevel,

    #[arg(long = "log.format", value_enum, global = true, group = "logging")]
    pub format: Option<LogFormat>,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, clap::ValueEnum, Clone, Copy)]
pub enum LogFormat {
    /// Plain text with no colors.
    Text,
    /// Same as text, with colors for interactive terminals.
    Color,
}

fn default_log_format() -> LogFormat {
    if atty::is(atty::Stream::Stderr) {
        LogFormat::Color
    } else {
        LogFormat::Text
    }
}

/// Initializes the tracing subscriber. Panics if called twice.
pub fn init_logging(args: &LogArgs) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(args.level.to_string())
        .with_target(false);

    match args.format.unwrap_or_else(default_log_format) {
        LogFormat::Text => builder.compact().with_ansi(false).init(),
        LogFormat::Color => builder.compact().with_ansi(true).init(),
    }
}
