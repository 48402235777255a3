//! Indented text listing of a [`HashTree`] and its depth-limited summary.
//!
//! ```text
//! root - 1,234 - 3f2a...
//!   a.txt - 3 - 78af...
//!   sub - 1,231 - 9c01...
//!     b.bin - 1,231 - 0e5d...
//! ```

use crate::tree::{DirectoryRecord, HashTree};
use crate::util::hashing::Digest;
use std::ffi::OsStr;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const INDENT: &str = "  ";

/// Suffix appended to the output path for the summary listing.
pub const SUMMARY_SUFFIX: &str = ".summary";

pub const DEFAULT_SUMMARY_DEPTH: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum OutputWriteError {
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OutputWriteError {
    fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::PermissionDenied {
            OutputWriteError::PermissionDenied(path.to_path_buf())
        } else {
            OutputWriteError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }
}

/// Full listing: every directory and file, pre-order, files before
/// subdirectories.
pub fn format_listing(tree: &HashTree) -> String {
    render(tree, None)
}

/// Directories only, down to `max_depth` levels below the root.
pub fn format_summary(tree: &HashTree, max_depth: usize) -> String {
    render(tree, Some(max_depth))
}

fn render(tree: &HashTree, max_depth: Option<usize>) -> String {
    let mut out = String::new();
    let root = tree.root();

    for (depth, dir) in root.walk() {
        if max_depth.is_some_and(|max| depth > max) {
            continue;
        }

        push_line(&mut out, depth, &lossy(dir.name()), dir.size(), dir.digest(), dir.error());

        if max_depth.is_none() {
            push_files(&mut out, depth + 1, dir);
        }
    }

    out
}

fn push_files(out: &mut String, depth: usize, dir: &DirectoryRecord) {
    for file in dir.files() {
        push_line(
            out,
            depth,
            &lossy(file.name()),
            file.size(),
            file.digest(),
            file.error(),
        );
    }
}

fn push_line(
    out: &mut String,
    depth: usize,
    name: &str,
    size: u64,
    digest: &Digest,
    error: Option<&str>,
) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(&format!("{} - {} - {}", name, format_size(size), digest));
    if let Some(error) = error {
        out.push_str(&format!(" [error: {error}]"));
    }
    out.push('\n');
}

fn lossy(name: &OsStr) -> String {
    name.to_string_lossy().into_owned()
}

/// Formats a byte count with `,` thousands separators.
pub fn format_size(bytes: u64) -> String {
    let digits = bytes.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Path of the summary written next to `output`.
pub fn summary_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(SUMMARY_SUFFIX);
    PathBuf::from(name)
}

/// Writes the full listing to `output` and the summary next to it.
///
/// Returns the summary path.
pub fn write_listing(
    tree: &HashTree,
    output: &Path,
    summary_depth: usize,
) -> Result<PathBuf, OutputWriteError> {
    write_atomic(output, format_listing(tree).as_bytes())?;

    let summary = summary_path(output);
    write_atomic(&summary, format_summary(tree, summary_depth).as_bytes())?;

    Ok(summary)
}

/// Writes `content` to a temporary file next to `path`, fsyncs it and
/// renames it into place.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), OutputWriteError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| OutputWriteError::from_io(parent, e))?;

    temp_file
        .write_all(content)
        .map_err(|e| OutputWriteError::from_io(path, e))?;

    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| OutputWriteError::from_io(path, e))?;

    temp_file
        .persist(path)
        .map_err(|e| OutputWriteError::from_io(path, e.error))?;

    Ok(())
}
