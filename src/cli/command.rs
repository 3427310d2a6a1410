use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use dsdio::ContainerFormat;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (dsdio ", env!("DSDIO_VERSION"), ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Convert between DSDIFF and DSF, unpacking DST-compressed audio",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on the first bad DST frame).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Severity at which frame-level problems abort instead of being logged.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a DSDIFF or DSF file, decompressing DST audio.
    Convert(ConvertArgs),

    /// Print stream information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input DSDIFF (.dff) or DSF (.dsf) file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Output container; guessed from the OUTPUT extension if omitted.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Do not copy ID3 tags.
    #[arg(long)]
    pub ignore_tags: bool,

    /// DST decoder threads (defaults to the number of CPUs).
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input DSDIFF or DSF file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Print the report as YAML.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    /// Philips DSDIFF (.dff).
    Dsdiff,
    /// Sony DSF (.dsf).
    Dsf,
}

impl From<OutputFormat> for ContainerFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Dsdiff => ContainerFormat::Dsdiff,
            OutputFormat::Dsf => ContainerFormat::Dsf,
        }
    }
}
