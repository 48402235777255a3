//! Offline comparison of two hash trees.
//!
//! Any subtree whose hash and size match on both sides is skipped without
//! looking inside, so comparing two large identical trees costs one check.

use crate::scan::{ScanError, ScanOptions, scan};
use crate::snapshot::{SnapshotError, load_tree};
use crate::tree::{DirectoryRecord, FileRecord, HashTree, NodeKind};
use crate::util::hashing::{Digest, HashAlgorithm};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("Cannot compare a {old} tree with a {new} tree")]
    AlgorithmMismatch {
        old: HashAlgorithm,
        new: HashAlgorithm,
    },
    #[error("Failed to load snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceKind {
    Added,
    Removed,
    Modified,
}

/// One side of a difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub kind: NodeKind,
    pub size: u64,
    pub digest: Digest,
    pub error: Option<String>,
}

impl EntryInfo {
    fn file(file: &FileRecord) -> Self {
        Self {
            kind: NodeKind::File,
            size: file.size(),
            digest: file.digest().clone(),
            error: file.error().map(str::to_string),
        }
    }

    fn dir(dir: &DirectoryRecord) -> Self {
        Self {
            kind: NodeKind::Directory,
            size: dir.size(),
            digest: dir.digest().clone(),
            error: dir.error().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub kind: DifferenceKind,
    /// Root-relative, `/`-separated. The root itself is `.`.
    pub path: String,
    pub old: Option<EntryInfo>,
    pub new: Option<EntryInfo>,
}

/// Where a tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Snapshot(PathBuf),
    Directory(PathBuf),
}

impl Source {
    /// A directory is scanned; anything else is read as a snapshot.
    pub fn detect(path: &Path) -> Self {
        if path.is_dir() {
            Source::Directory(path.to_path_buf())
        } else {
            Source::Snapshot(path.to_path_buf())
        }
    }
}

/// Loads or scans both sides.
///
/// A live directory is scanned with the exclusions and algorithm of the
/// snapshot on the other side, so the two trees are comparable. When both
/// sides are directories, `options` applies to both.
pub fn resolve_sources(
    old: &Source,
    new: &Source,
    options: &ScanOptions,
) -> Result<(HashTree, HashTree), CompareError> {
    match (old, new) {
        (Source::Snapshot(old), Source::Snapshot(new)) => Ok((load(old)?, load(new)?)),
        (Source::Snapshot(old), Source::Directory(new)) => {
            let old = load(old)?;
            let new = scan(new, &options_matching(&old, options))?;
            Ok((old, new))
        }
        (Source::Directory(old), Source::Snapshot(new)) => {
            let new = load(new)?;
            let old = scan(old, &options_matching(&new, options))?;
            Ok((old, new))
        }
        (Source::Directory(old), Source::Directory(new)) => {
            Ok((scan(old, options)?, scan(new, options)?))
        }
    }
}

fn load(path: &Path) -> Result<HashTree, CompareError> {
    load_tree(path).map_err(|source| CompareError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

fn options_matching(tree: &HashTree, base: &ScanOptions) -> ScanOptions {
    if !base.exclude.is_empty() && base.exclude != tree.exclusions() {
        info!("Using the snapshot's exclusions instead of the ones given");
    }
    ScanOptions {
        exclude: tree.exclusions().to_vec(),
        algorithm: tree.algorithm(),
        ..base.clone()
    }
}

/// Lists every entry added, removed or modified between `old` and `new`,
/// ordered by path.
///
/// A removed or added directory is reported once, not entry by entry. An
/// entry that changed between file and directory is `Modified`. A directory
/// that could not be read on either side is reported as `Modified` when its
/// hash differs, without descending into it.
pub fn compare(old: &HashTree, new: &HashTree) -> Result<Vec<Difference>, CompareError> {
    if old.algorithm() != new.algorithm() {
        return Err(CompareError::AlgorithmMismatch {
            old: old.algorithm(),
            new: new.algorithm(),
        });
    }

    let mut differences = Vec::new();
    compare_dirs(old.root(), new.root(), "", &mut differences);
    differences.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(differences)
}

#[derive(Clone, Copy)]
enum Node<'t> {
    File(&'t FileRecord),
    Dir(&'t DirectoryRecord),
}

impl Node<'_> {
    fn info(self) -> EntryInfo {
        match self {
            Node::File(file) => EntryInfo::file(file),
            Node::Dir(dir) => EntryInfo::dir(dir),
        }
    }
}

fn compare_dirs(
    old: &DirectoryRecord,
    new: &DirectoryRecord,
    prefix: &str,
    out: &mut Vec<Difference>,
) {
    if old.digest() == new.digest() && old.size() == new.size() {
        return;
    }
    if old.error().is_some() || new.error().is_some() {
        out.push(Difference {
            kind: DifferenceKind::Modified,
            path: display_path(prefix),
            old: Some(EntryInfo::dir(old)),
            new: Some(EntryInfo::dir(new)),
        });
        return;
    }

    let mut merged: BTreeMap<&OsStr, (Option<Node>, Option<Node>)> = BTreeMap::new();
    for file in old.files() {
        merged.entry(file.name()).or_default().0 = Some(Node::File(file));
    }
    for dir in old.dirs() {
        merged.entry(dir.name()).or_default().0 = Some(Node::Dir(dir));
    }
    for file in new.files() {
        merged.entry(file.name()).or_default().1 = Some(Node::File(file));
    }
    for dir in new.dirs() {
        merged.entry(dir.name()).or_default().1 = Some(Node::Dir(dir));
    }

    for (name, pair) in merged {
        let path = join(prefix, name);
        let difference = |kind, old: Option<Node>, new: Option<Node>| Difference {
            kind,
            path: path.clone(),
            old: old.map(Node::info),
            new: new.map(Node::info),
        };

        match pair {
            (Some(old), None) => out.push(difference(DifferenceKind::Removed, Some(old), None)),
            (None, Some(new)) => out.push(difference(DifferenceKind::Added, None, Some(new))),
            (Some(Node::Dir(old)), Some(Node::Dir(new))) => compare_dirs(old, new, &path, out),
            (Some(Node::File(a)), Some(Node::File(b))) => {
                if a.digest() != b.digest() || a.size() != b.size() {
                    out.push(difference(
                        DifferenceKind::Modified,
                        Some(Node::File(a)),
                        Some(Node::File(b)),
                    ));
                }
            }
            (Some(old), Some(new)) => {
                out.push(difference(DifferenceKind::Modified, Some(old), Some(new)))
            }
            (None, None) => {}
        }
    }
}

fn join(prefix: &str, name: &OsStr) -> String {
    let name = name.to_string_lossy();
    if prefix.is_empty() {
        name.into_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

fn display_path(relative: &str) -> String {
    if relative.is_empty() {
        ".".to_string()
    } else {
        relative.to_string()
    }
}

pub fn print_differences(differences: &[Difference]) {
    for line in format_differences(differences) {
        println!("{}", line);
    }
}

fn format_differences(differences: &[Difference]) -> Vec<String> {
    let mut lines = Vec::new();
    for difference in differences {
        let code = match difference.kind {
            DifferenceKind::Added => "A",
            DifferenceKind::Removed => "R",
            DifferenceKind::Modified => "M",
        };
        lines.push(format!("{:<2} {}", code, difference.path));
        if let (Some(old), Some(new)) = (&difference.old, &difference.new) {
            lines.extend(format_change(old, new));
        }
    }
    lines
}

fn format_change(old: &EntryInfo, new: &EntryInfo) -> Vec<String> {
    if old.kind != new.kind {
        return vec![
            format!("   was: {}", format_kind(old)),
            format!("   now: {}", format_kind(new)),
        ];
    }

    let mut lines = Vec::new();
    if old.size != new.size {
        lines.push(format!(
            "   size: {} -> {}",
            crate::listing::format_size(old.size),
            crate::listing::format_size(new.size)
        ));
    }
    if old.digest != new.digest {
        lines.push(format!(
            "   hash: {} -> {}",
            truncate_hash(&old.digest),
            truncate_hash(&new.digest)
        ));
    }
    for (side, info) in [("old", old), ("new", new)] {
        if let Some(error) = &info.error {
            lines.push(format!("   {side} error: {error}"));
        }
    }
    lines
}

fn format_kind(info: &EntryInfo) -> String {
    match info.kind {
        NodeKind::File => format!(
            "file ({} bytes, hash: {})",
            crate::listing::format_size(info.size),
            truncate_hash(&info.digest)
        ),
        NodeKind::Directory => "directory".to_string(),
    }
}

fn truncate_hash(digest: &Digest) -> String {
    if digest.is_sentinel() {
        return "unreadable".to_string();
    }
    let hex = digest.to_hex();
    if hex.len() > 12 {
        format!("{}...", &hex[..12])
    } else {
        hex
    }
}
