use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nmxfread ",
    env!("MXFREAD_VERSION"),
    "\nbuilt ",
    env!("BUILD_TIMESTAMP"),
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting and reading essence from MXF files and converting RDD-6 metadata",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
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
    /// Level at which recoverable conditions become errors.
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
    /// Print clip, track and timecode information.
    Info(InfoArgs),

    /// Read essence frames into one raw file per track.
    Extract(ExtractArgs),

    /// Convert an RDD-6 frame between binary and XML.
    Rdd6(Rdd6Args),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input MXF file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Plain)]
    pub format: ReportFormat,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input MXF file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory for the per-track output files.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// First frame to read.
    #[arg(long, value_name = "FRAME", default_value_t = 0)]
    pub start: i64,

    /// Number of frames to read (default: to the end).
    #[arg(long, value_name = "FRAMES")]
    pub count: Option<i64>,

    /// Verify essence elements against the content package CRC-32 element.
    #[arg(long)]
    pub check_crc: bool,

    /// Read audio-only clips at this frame rate, e.g. "30000/1001".
    #[arg(long, value_name = "RATE")]
    pub frame_rate: Option<String>,

    /// Only extract these tracks (0-based, repeatable).
    #[arg(long = "track", value_name = "INDEX")]
    pub tracks: Vec<usize>,
}

#[derive(Debug, Args)]
pub struct Rdd6Args {
    /// Input RDD-6 frame: binary, or XML when the extension is ".xml".
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file, written in the other representation.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
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
pub enum ReportFormat {
    /// Aligned text.
    Plain,
    /// YAML document.
    Yaml,
}
