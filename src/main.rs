mod checksum;
mod cli;
mod compare;
mod dir_list;
mod exclude;
mod listing;
mod progress;
mod scan;
mod snapshot;
mod tree;
mod util;

use anyhow::Context;
use cli::{Cli, Command, LogLevel};
use compare::{Source, compare, print_differences, resolve_sources};
use scan::{ScanOptions, scan};
use std::fmt as stdfmt;
use std::io::{IsTerminal, Write, stderr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tree::NodeKind;
use tracing::{Event, Level, Subscriber, debug, error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use util::hashing::HashAlgorithm;

struct TreehashExitCode;

impl TreehashExitCode {
    /// Exit code used when `compare` found differences.
    fn differences_found() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for other errors (I/O errors, invalid arguments, etc.).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

struct ScanArgs {
    path: PathBuf,
    output: Option<PathBuf>,
    snapshot: Option<PathBuf>,
    options: ScanOptions,
    summary_depth: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_level);

    // Change working directory if -C was specified
    if let Some(directory) = cli.directory
        && let Err(e) = std::env::set_current_dir(&directory)
    {
        error!(
            "Failed to change directory to {}: {}",
            directory.display(),
            e
        );
        return TreehashExitCode::any_error();
    }

    let result: anyhow::Result<ExitCode> = match cli.command {
        Command::Scan {
            path,
            output,
            snapshot,
            exclude,
            jobs,
            progress_interval,
            algorithm,
            summary_depth,
        } => handle_scan(ScanArgs {
            path,
            output,
            snapshot,
            options: ScanOptions {
                exclude,
                concurrency: jobs,
                progress_interval: Duration::from_secs(progress_interval),
                algorithm,
            },
            summary_depth,
        }),
        Command::Compare {
            old,
            new,
            jobs,
            exclude,
            algorithm,
        } => handle_compare(old, new, compare_options(jobs, exclude, algorithm)),
    };

    match result {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err:#}");
            TreehashExitCode::any_error()
        }
    }
}

fn compare_options(jobs: usize, exclude: Vec<String>, algorithm: HashAlgorithm) -> ScanOptions {
    ScanOptions {
        exclude,
        concurrency: jobs,
        algorithm,
        ..ScanOptions::default()
    }
}

fn handle_scan(args: ScanArgs) -> anyhow::Result<ExitCode> {
    let tree = scan(&args.path, &args.options)?;

    let errors = tree.errors();
    if !errors.is_empty() {
        let dirs = errors
            .iter()
            .filter(|e| e.kind == NodeKind::Directory)
            .count();
        warn!(
            "{} entries could not be read ({} files, {} directories) and were hashed as unreadable",
            errors.len(),
            errors.len() - dirs,
            dirs
        );
        for error in &errors {
            debug!("  {}: {}", error.path.display(), error.message);
        }
    }

    match &args.output {
        Some(output) => {
            let summary = listing::write_listing(&tree, output, args.summary_depth)?;
            info!(
                "Wrote listing to {} and summary to {}",
                output.display(),
                summary.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(listing::format_listing(&tree).as_bytes())
                .and_then(|()| stdout.flush())
                .context("Failed to write listing to stdout")?;
        }
    }

    if let Some(path) = &args.snapshot {
        snapshot::save_tree(&tree, path)
            .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
        info!("Saved snapshot to {}", path.display());
    }

    info!(
        "Root hash of {}: {} ({} bytes, {} files, {} directories)",
        util::paths::display(tree.root().path()).display(),
        tree.root().digest(),
        listing::format_size(tree.root().size()),
        tree.file_count(),
        tree.dir_count()
    );

    Ok(ExitCode::SUCCESS)
}

fn handle_compare(old: PathBuf, new: PathBuf, options: ScanOptions) -> anyhow::Result<ExitCode> {
    let (old_tree, new_tree) =
        resolve_sources(&Source::detect(&old), &Source::detect(&new), &options)?;

    let differences = compare(&old_tree, &new_tree)?;

    if differences.is_empty() {
        info!("No differences: both trees hash to {}", old_tree.root().digest());
        return Ok(ExitCode::SUCCESS);
    }

    print_differences(&differences);

    info!("{} difference(s) found", differences.len());
    Ok(TreehashExitCode::differences_found())
}

/// Filter directive from the command line flags, if any.
///
/// `None` leaves the choice to `RUST_LOG`, falling back to `warn`.
fn level_from_flags(verbose: u8, log_level: Option<LogLevel>) -> Option<&'static str> {
    if let Some(level) = log_level {
        return Some(level.as_directive());
    }
    match verbose {
        0 => None,
        1 => Some("info"),
        _ => Some("debug"),
    }
}

fn init_tracing(verbose: u8, log_level: Option<LogLevel>) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = LevelPrefixFormatter { stderr_is_terminal };

    let filter = match level_from_flags(verbose, log_level) {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Prefixes each log line with its level: an emoji when stderr is a
/// terminal, plain `LEVEL: ` text when it is captured.
struct LevelPrefixFormatter {
    stderr_is_terminal: bool,
}

fn level_prefix(level: Level, terminal: bool) -> &'static str {
    let (emoji, text) = match level {
        Level::ERROR => ("❌️ ", "ERROR: "),
        Level::WARN => ("⚠️  ", "WARN: "),
        Level::INFO => ("ℹ️ ", "INFO: "),
        Level::DEBUG => ("🔍 ", "DEBUG: "),
        _ => ("🔬 ", "TRACE: "),
    };
    if terminal { emoji } else { text }
}

impl<S, N> FormatEvent<S, N> for LevelPrefixFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let level = *event.metadata().level();
        writer.write_str(level_prefix(level, self.stderr_is_terminal))?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
