mod help_text;

use crate::listing::DEFAULT_SUMMARY_DEPTH;
use crate::util::hashing::HashAlgorithm;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deterministic content hash trees for comparing directories offline
#[derive(Parser, Debug)]
#[command(name = "treehash", version, about, long_about = help_text::ROOT_LONG_ABOUT)]
pub struct Cli {
    /// Change to DIR before doing anything else
    #[arg(short = 'C', value_name = "DIR", global = true)]
    pub directory: Option<PathBuf>,

    /// More log output (-v: info, -vv: debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "log_level")]
    pub verbose: u8,

    /// Log level to use. Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL", value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hash a directory tree and write its listing and snapshot
    #[command(long_about = help_text::SCAN_LONG_ABOUT)]
    Scan {
        /// Directory to hash
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Write the listing to OUTPUT (and a summary to OUTPUT.summary) instead of stdout
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Also save a snapshot that `compare` can read
        #[arg(long, value_name = "FILE")]
        snapshot: Option<PathBuf>,

        /// Skip entries whose root-relative path matches REGEX at its start (repeatable)
        #[arg(short, long = "exclude", value_name = "REGEX")]
        exclude: Vec<String>,

        /// Number of worker threads (0: one per CPU)
        #[arg(short, long, value_name = "N", default_value_t = 0)]
        jobs: usize,

        /// Seconds between progress reports at info level (0: never)
        #[arg(long, value_name = "SECS", default_value_t = 5)]
        progress_interval: u64,

        /// Digest algorithm
        #[arg(long, value_enum, default_value_t = HashAlgorithm::Xxh3)]
        algorithm: HashAlgorithm,

        /// Directory levels included in the summary listing
        #[arg(long, value_name = "N", default_value_t = DEFAULT_SUMMARY_DEPTH)]
        summary_depth: usize,
    },

    /// Compare two snapshots, or a snapshot and a directory. Exits with 1 if they differ.
    #[command(long_about = help_text::COMPARE_LONG_ABOUT)]
    Compare {
        /// Old side: snapshot file or directory
        #[arg(value_name = "OLD")]
        old: PathBuf,

        /// New side: snapshot file or directory
        #[arg(value_name = "NEW")]
        new: PathBuf,

        /// Number of worker threads when scanning a directory (0: one per CPU)
        #[arg(short, long, value_name = "N", default_value_t = 0)]
        jobs: usize,

        /// Exclusions when both sides are directories (repeatable)
        #[arg(short, long = "exclude", value_name = "REGEX")]
        exclude: Vec<String>,

        /// Digest algorithm when both sides are directories
        #[arg(long, value_enum, default_value_t = HashAlgorithm::Xxh3)]
        algorithm: HashAlgorithm,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
