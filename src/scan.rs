//! Concurrent scan of a directory tree into a [`HashTree`].
//!
//! A fixed pool of worker threads drains one unbounded task queue. Each task
//! lists one directory and hashes its files. A directory without
//! subdirectories is sealed on the spot; otherwise a [`WorkUnit`] is created
//! for it and one task per subdirectory is queued, each carrying a link to
//! that unit and its slot in the sorted child list.
//!
//! When a directory is sealed it registers itself with its parent unit. The
//! registration that fills the last slot seals the parent, which in turn
//! registers with its own parent, and so on. Sealing the root ends the scan;
//! an empty queue on its own never does.
//!
//! Every unit has its own lock and no lock is ever held across two units.

use crate::checksum::checksum_file;
use crate::dir_list::list_directory;
use crate::exclude::{ExcludeError, ExclusionMatcher};
use crate::progress::ProgressReporter;
use crate::tree::{DirectoryRecord, FileRecord, HashTree, PartialDirectory};
use crate::util::hashing::HashAlgorithm;
use crate::util::paths;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Exclude(#[from] ExcludeError),
    #[error("Failed to start worker thread: {0}")]
    Spawn(std::io::Error),
    #[error("Scheduler protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
}

/// A defect in the fan-in bookkeeping. Never caused by filesystem state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("{child} registered twice with {parent} (slot {slot})")]
    DuplicateRegistration {
        parent: PathBuf,
        child: PathBuf,
        slot: usize,
    },
    #[error("{child} registered with {parent} after it was finalized")]
    RegisteredAfterFinalize { parent: PathBuf, child: PathBuf },
    #[error("{child} registered at slot {slot} but {parent} expects only {expected} children")]
    SlotOutOfRange {
        parent: PathBuf,
        child: PathBuf,
        slot: usize,
        expected: usize,
    },
    #[error("{child} registered at slot {slot} of {parent}, which belongs to {expected}")]
    WrongChild {
        parent: PathBuf,
        child: PathBuf,
        slot: usize,
        expected: PathBuf,
    },
    #[error(
        "no work left but {root} was never finalized ({pending} directories still awaiting children)"
    )]
    MissingRegistration { root: PathBuf, pending: usize },
    #[error("task for {path} panicked before registering with its parent")]
    TaskPanicked { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Regular expressions matched against root-relative paths, anchored at the start.
    pub exclude: Vec<String>,
    /// Number of worker threads. Zero means one per available CPU.
    pub concurrency: usize,
    /// Minimum time between progress reports. Zero disables them.
    pub progress_interval: Duration,
    pub algorithm: HashAlgorithm,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            concurrency: 0,
            progress_interval: Duration::ZERO,
            algorithm: HashAlgorithm::default(),
        }
    }
}

/// Scans `root` and returns the sealed tree.
///
/// Fails only when the root is missing or not a directory, an exclude pattern
/// does not compile, or the scheduler detects a protocol violation. Files and
/// directories that cannot be read are recorded on their nodes instead.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<HashTree, ScanError> {
    let reporter = ProgressReporter::new(options.progress_interval);
    scan_with_progress(root, options, &reporter)
}

pub fn scan_with_progress(
    root: &Path,
    options: &ScanOptions,
    reporter: &ProgressReporter,
) -> Result<HashTree, ScanError> {
    let exclusions = ExclusionMatcher::new(&options.exclude)?;
    let root = resolve_root(root)?;
    let workers = effective_concurrency(options.concurrency);

    debug!(
        "Scanning {} with {} workers",
        paths::display(&root).display(),
        workers
    );

    reporter.start();
    let result = run(&root, options.algorithm, &exclusions, reporter, workers);
    reporter.stop();

    Ok(HashTree::new(
        result?,
        options.algorithm,
        exclusions.patterns().to_vec(),
        Utc::now(),
    ))
}

fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = std::fs::canonicalize(root).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ScanError::RootNotFound(root.to_path_buf()),
        ErrorKind::PermissionDenied => ScanError::PermissionDenied(root.to_path_buf()),
        _ => ScanError::Io {
            path: root.to_path_buf(),
            source: e,
        },
    })?;
    let canonical = paths::normalize(&canonical);

    let metadata = std::fs::metadata(&canonical).map_err(|e| ScanError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    Ok(canonical)
}

fn effective_concurrency(requested: usize) -> usize {
    match requested {
        0 => thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        n => n,
    }
}

/// Where a finished directory reports to: a pending unit and a slot in it.
#[derive(Clone)]
struct ParentLink {
    unit: Arc<WorkUnit>,
    slot: usize,
}

/// Bookkeeping for a directory waiting on its subdirectories.
struct WorkUnit {
    path: PathBuf,
    parent: Option<ParentLink>,
    /// Expected child paths, in slot order.
    children: Vec<PathBuf>,
    state: Mutex<UnitState>,
}

struct UnitState {
    /// Taken when the unit is finalized.
    partial: Option<PartialDirectory>,
    received: Vec<Option<DirectoryRecord>>,
    received_count: usize,
}

impl WorkUnit {
    fn new(partial: PartialDirectory, parent: Option<ParentLink>, children: Vec<PathBuf>) -> Arc<Self> {
        let expected = children.len();
        Arc::new(Self {
            path: partial.path().to_path_buf(),
            parent,
            children,
            state: Mutex::new(UnitState {
                partial: Some(partial),
                received: (0..expected).map(|_| None).collect(),
                received_count: 0,
            }),
        })
    }

    fn expected(&self) -> usize {
        self.children.len()
    }

    /// Records a finished child.
    ///
    /// Returns the sealed directory when this registration was the last one
    /// expected, `None` while children are still outstanding.
    fn register(
        &self,
        slot: usize,
        child: DirectoryRecord,
    ) -> Result<Option<DirectoryRecord>, ProtocolViolation> {
        let Some(expected_path) = self.children.get(slot) else {
            return Err(ProtocolViolation::SlotOutOfRange {
                parent: self.path.clone(),
                child: child.path().to_path_buf(),
                slot,
                expected: self.expected(),
            });
        };
        if child.path() != expected_path {
            return Err(ProtocolViolation::WrongChild {
                parent: self.path.clone(),
                child: child.path().to_path_buf(),
                slot,
                expected: expected_path.clone(),
            });
        }

        let (partial, children) = {
            let mut state = self.state.lock();
            if state.partial.is_none() {
                return Err(ProtocolViolation::RegisteredAfterFinalize {
                    parent: self.path.clone(),
                    child: child.path().to_path_buf(),
                });
            }
            if state.received.get(slot).is_some_and(Option::is_some) {
                return Err(ProtocolViolation::DuplicateRegistration {
                    parent: self.path.clone(),
                    child: child.path().to_path_buf(),
                    slot,
                });
            }

            state.received[slot] = Some(child);
            state.received_count += 1;
            if state.received_count < self.expected() {
                return Ok(None);
            }

            let Some(partial) = state.partial.take() else {
                return Err(ProtocolViolation::RegisteredAfterFinalize {
                    parent: self.path.clone(),
                    child: self.children[slot].clone(),
                });
            };
            let children: Vec<DirectoryRecord> =
                std::mem::take(&mut state.received).into_iter().flatten().collect();
            (partial, children)
        };

        Ok(Some(partial.seal(children)))
    }
}

struct Task {
    path: PathBuf,
    parent: Option<ParentLink>,
    /// `(index, total)` per level below the root, for progress reports.
    position: Vec<(usize, usize)>,
}

enum Job {
    Scan(Task),
    Stop,
}

type Outcome = Result<DirectoryRecord, ProtocolViolation>;

/// State shared by all workers of one scan.
struct Shared<'a> {
    root: &'a Path,
    algorithm: HashAlgorithm,
    exclusions: &'a ExclusionMatcher,
    progress: &'a ProgressReporter,
    jobs: Sender<Job>,
    done: Sender<Outcome>,
    /// Tasks queued or running.
    outstanding: AtomicUsize,
    /// Units created and not yet finalized. Diagnostics only.
    pending_units: AtomicUsize,
    finished: AtomicBool,
    aborted: AtomicBool,
}

impl<'a> Shared<'a> {
    fn new(
        root: &'a Path,
        algorithm: HashAlgorithm,
        exclusions: &'a ExclusionMatcher,
        progress: &'a ProgressReporter,
    ) -> (Self, Receiver<Job>, Receiver<Outcome>) {
        let (jobs, job_rx) = crossbeam_channel::unbounded();
        let (done, done_rx) = crossbeam_channel::bounded(1);
        let shared = Self {
            root,
            algorithm,
            exclusions,
            progress,
            jobs,
            done,
            outstanding: AtomicUsize::new(0),
            pending_units: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        };
        (shared, job_rx, done_rx)
    }

    fn enqueue(&self, task: Task) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        if self.jobs.send(Job::Scan(task)).is_err() {
            // The root can no longer finish; the last guard reports it.
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn fail(&self, violation: ProtocolViolation) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            let _ = self.done.try_send(Err(violation));
        }
    }

    /// Registers a sealed directory upward until a unit is still waiting or
    /// the root is reached.
    fn complete(
        &self,
        mut record: DirectoryRecord,
        mut parent: Option<ParentLink>,
    ) -> Result<(), ProtocolViolation> {
        loop {
            let Some(link) = parent else {
                self.finished.store(true, Ordering::Release);
                let _ = self.done.try_send(Ok(record));
                return Ok(());
            };
            match link.unit.register(link.slot, record)? {
                None => return Ok(()),
                Some(sealed) => {
                    self.pending_units.fetch_sub(1, Ordering::AcqRel);
                    record = sealed;
                    parent = link.unit.parent.clone();
                }
            }
        }
    }

    /// Lists one directory, hashes its files, and either seals it or fans
    /// out its subdirectories.
    fn process(&self, task: Task) -> Result<(), ProtocolViolation> {
        let Task {
            path,
            parent,
            position,
        } = task;

        let listing = match list_directory(&path, self.root, self.exclusions) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Cannot list {}: {}", paths::display(&path).display(), e);
                self.progress.record_directory(&path, &position, 0, 0);
                let sealed = PartialDirectory::unreadable(path, self.algorithm, e).seal(Vec::new());
                return self.complete(sealed, parent);
            }
        };

        let files: Vec<FileRecord> = listing
            .files
            .into_iter()
            .map(|entry| hash_entry(entry.path, self.algorithm))
            .collect();
        let bytes: u64 = files.iter().map(FileRecord::size).sum();
        self.progress
            .record_directory(&path, &position, files.len() as u64, bytes);

        let partial = PartialDirectory::from_files(path, self.algorithm, files);

        if listing.dirs.is_empty() {
            return self.complete(partial.seal(Vec::new()), parent);
        }

        let total = listing.dirs.len();
        let unit = WorkUnit::new(
            partial,
            parent,
            listing.dirs.iter().map(|d| d.path.clone()).collect(),
        );
        self.pending_units.fetch_add(1, Ordering::AcqRel);

        for (slot, dir) in listing.dirs.into_iter().enumerate() {
            let mut child_position = position.clone();
            child_position.push((slot + 1, total));
            self.enqueue(Task {
                path: dir.path,
                parent: Some(ParentLink {
                    unit: Arc::clone(&unit),
                    slot,
                }),
                position: child_position,
            });
        }

        Ok(())
    }
}

/// Marks one task as finished when dropped, including on unwind.
///
/// The guard that takes the outstanding count to zero checks that the root
/// was finalized; if not, some registration never happened.
struct TaskGuard<'s, 'a> {
    shared: &'s Shared<'a>,
}

impl<'s, 'a> TaskGuard<'s, 'a> {
    fn new(shared: &'s Shared<'a>) -> Self {
        Self { shared }
    }
}

impl Drop for TaskGuard<'_, '_> {
    fn drop(&mut self) {
        let shared = self.shared;
        if shared.outstanding.fetch_sub(1, Ordering::AcqRel) == 1
            && !shared.finished.load(Ordering::Acquire)
        {
            shared.fail(ProtocolViolation::MissingRegistration {
                root: shared.root.to_path_buf(),
                pending: shared.pending_units.load(Ordering::Acquire),
            });
        }
    }
}

fn hash_entry(path: PathBuf, algorithm: HashAlgorithm) -> FileRecord {
    match checksum_file(&path, algorithm) {
        Ok(checksum) => FileRecord::hashed(path, checksum),
        Err(e) => {
            warn!("Cannot read {}: {}", paths::display(&path).display(), e);
            FileRecord::unreadable(path, algorithm, e)
        }
    }
}

fn worker_loop(shared: &Shared<'_>, jobs: Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        let task = match job {
            Job::Scan(task) => task,
            Job::Stop => break,
        };
        let _guard = TaskGuard::new(shared);
        if shared.aborted.load(Ordering::Acquire) {
            continue;
        }
        let path = task.path.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| shared.process(task))) {
            Ok(Ok(())) => {}
            Ok(Err(violation)) => shared.fail(violation),
            Err(_) => shared.fail(ProtocolViolation::TaskPanicked { path }),
        }
    }
}

fn run(
    root: &Path,
    algorithm: HashAlgorithm,
    exclusions: &ExclusionMatcher,
    progress: &ProgressReporter,
    workers: usize,
) -> Result<DirectoryRecord, ScanError> {
    let (shared, job_rx, done_rx) = Shared::new(root, algorithm, exclusions, progress);

    shared.enqueue(Task {
        path: root.to_path_buf(),
        parent: None,
        position: Vec::new(),
    });

    thread::scope(|scope| {
        let shared = &shared;
        let mut handles = Vec::with_capacity(workers);
        let mut spawn_error = None;

        for id in 0..workers {
            let jobs = job_rx.clone();
            match thread::Builder::new()
                .name(format!("scan-{id}"))
                .spawn_scoped(scope, move || worker_loop(shared, jobs))
            {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        let outcome = match spawn_error {
            Some(e) => {
                shared.aborted.store(true, Ordering::Release);
                Err(ScanError::Spawn(e))
            }
            None => match done_rx.recv() {
                Ok(Ok(record)) => Ok(record),
                Ok(Err(violation)) => Err(ScanError::Protocol(violation)),
                Err(_) => Err(ScanError::Protocol(ProtocolViolation::MissingRegistration {
                    root: root.to_path_buf(),
                    pending: shared.pending_units.load(Ordering::Acquire),
                })),
            },
        };

        for _ in 0..handles.len() {
            let _ = shared.jobs.send(Job::Stop);
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!("A scan worker panicked");
            }
        }

        outcome
    })
}

#[cfg(test)]
pub(crate) mod tests;
