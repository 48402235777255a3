//! Scan progress reporting.
//!
//! The reporter is handed to the scheduler explicitly and has a
//! `start`/`stop` lifecycle. Workers call [`ProgressReporter::record_directory`]
//! once per listed directory; the sink is invoked at most once per interval.
//! Nothing here feeds back into the scan result.

use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Where a directory sits in the traversal: one `(index, total)` pair per
/// level below the root, `index` counted from 1.
pub type Position = [(usize, usize)];

/// Receives throttled progress callbacks.
pub trait ProgressSink: Send + Sync {
    fn report(&self, path: &Path, position: &Position, snapshot: &ProgressSnapshot);
}

/// Default sink: one info-level log line per report.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, path: &Path, position: &Position, snapshot: &ProgressSnapshot) {
        info!(
            "Scanning {} [{}] ({} dirs, {} files so far)",
            path.display(),
            format_position(position),
            snapshot.dirs_scanned,
            snapshot.files_scanned
        );
    }
}

/// Counters at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub dirs_scanned: u64,
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub elapsed: Duration,
}

pub struct ProgressReporter {
    interval: Duration,
    sink: Box<dyn ProgressSink>,
    started: OnceLock<Instant>,
    stopped: AtomicBool,
    /// Milliseconds since start at which the sink was last called, plus one.
    /// Zero means never.
    last_report_ms: AtomicU64,
    dirs_scanned: AtomicU64,
    files_scanned: AtomicU64,
    bytes_scanned: AtomicU64,
}

impl ProgressReporter {
    /// Reporter logging through `tracing`. A zero interval disables reports.
    pub fn new(interval: Duration) -> Self {
        Self::with_sink(interval, Box::new(LogSink))
    }

    pub fn with_sink(interval: Duration, sink: Box<dyn ProgressSink>) -> Self {
        Self {
            interval,
            sink,
            started: OnceLock::new(),
            stopped: AtomicBool::new(false),
            last_report_ms: AtomicU64::new(0),
            dirs_scanned: AtomicU64::new(0),
            files_scanned: AtomicU64::new(0),
            bytes_scanned: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn start(&self) {
        self.started.get_or_init(Instant::now);
        self.stopped.store(false, Ordering::Release);
    }

    /// Stops reporting and logs a summary of what was scanned.
    pub fn stop(&self) -> ProgressSnapshot {
        self.stopped.store(true, Ordering::Release);
        let snapshot = self.snapshot();
        info!(
            "Scanned {} directories, {} files, {} bytes in {:.2?}",
            snapshot.dirs_scanned, snapshot.files_scanned, snapshot.bytes_scanned, snapshot.elapsed
        );
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            dirs_scanned: self.dirs_scanned.load(Ordering::Relaxed),
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            elapsed: self.started.get().map(Instant::elapsed).unwrap_or_default(),
        }
    }

    /// Counts one listed directory and reports it if the interval has passed.
    pub fn record_directory(&self, path: &Path, position: &Position, files: u64, bytes: u64) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
        self.files_scanned.fetch_add(files, Ordering::Relaxed);
        self.bytes_scanned.fetch_add(bytes, Ordering::Relaxed);

        if self.interval.is_zero() || self.stopped.load(Ordering::Acquire) {
            return;
        }
        let Some(started) = self.started.get() else {
            return;
        };

        let now_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        let last = self.last_report_ms.load(Ordering::Relaxed);

        // The first directory is not reported; the interval runs from start.
        let due = match last {
            0 => now_ms >= interval_ms,
            n => now_ms.saturating_sub(n - 1) >= interval_ms,
        };
        if !due {
            return;
        }
        // Only the worker that wins the exchange reports.
        if self
            .last_report_ms
            .compare_exchange(last, now_ms + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.sink.report(path, position, &self.snapshot());
        }
    }
}

/// Formats a position as `3/10 > 1/4`.
pub fn format_position(position: &Position) -> String {
    if position.is_empty() {
        return "root".to_string();
    }
    position
        .iter()
        .map(|(index, total)| format!("{index}/{total}"))
        .collect::<Vec<_>>()
        .join(" > ")
}
