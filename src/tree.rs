//! The aggregation tree produced by a scan or rebuilt from a snapshot.
//!
//! A directory is built in two stages. [`PartialDirectory`] holds the sorted
//! file list and the file-only partial hash, which are known as soon as the
//! directory itself has been listed. [`PartialDirectory::seal`] combines that
//! with the finished child directories into a [`DirectoryRecord`]. Only
//! sealed records exist as `DirectoryRecord` values, so an aggregate hash can
//! never be read before all children have reported.
//!
//! Combination order (stable across versions and platforms):
//!
//! ```text
//! partial   = H( for f in files by name:  len|name, len|digest, size )
//! aggregate = H( len|partial, for d in dirs by name: len|name, len|aggregate, size )
//! ```
//!
//! where `len|x` is a big-endian u64 length followed by the bytes and every
//! integer is a big-endian u64. A directory that could not be listed has the
//! sentinel digest and size 0.

use crate::checksum::FileChecksum;
use crate::util::hashing::{
    Digest, HashAlgorithm, hash_field, hash_name_field, hash_u64_field,
};
use crate::util::paths;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    path: PathBuf,
    size: u64,
    digest: Digest,
    error: Option<String>,
}

impl FileRecord {
    pub fn hashed(path: PathBuf, checksum: FileChecksum) -> Self {
        Self {
            path,
            size: checksum.size,
            digest: checksum.digest,
            error: None,
        }
    }

    /// A file that could not be read: size 0, sentinel digest, error kept.
    pub fn unreadable(path: PathBuf, algorithm: HashAlgorithm, error: impl Display) -> Self {
        Self {
            path,
            size: 0,
            digest: algorithm.sentinel(),
            error: Some(error.to_string()),
        }
    }

    pub(crate) fn from_parts(
        path: PathBuf,
        size: u64,
        digest: Digest,
        error: Option<String>,
    ) -> Self {
        Self {
            path,
            size,
            digest,
            error,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &OsStr {
        entry_name(&self.path)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// A directory whose own files are hashed but whose children are pending.
#[derive(Debug)]
pub struct PartialDirectory {
    path: PathBuf,
    algorithm: HashAlgorithm,
    files: Vec<FileRecord>,
    files_size: u64,
    partial_digest: Digest,
    error: Option<String>,
}

impl PartialDirectory {
    /// Computes the file-only partial hash. `files` is sorted by name here.
    pub fn from_files(path: PathBuf, algorithm: HashAlgorithm, mut files: Vec<FileRecord>) -> Self {
        files.sort_by(|a, b| a.name().cmp(b.name()));

        let mut hasher = algorithm.hasher();
        let mut files_size = 0u64;
        for file in &files {
            hash_name_field(&mut hasher, file.name());
            hash_field(&mut hasher, file.digest.as_bytes());
            hash_u64_field(&mut hasher, file.size);
            files_size += file.size;
        }

        Self {
            path,
            algorithm,
            files,
            files_size,
            partial_digest: hasher.finalize(),
            error: None,
        }
    }

    /// A directory that could not be listed.
    pub fn unreadable(path: PathBuf, algorithm: HashAlgorithm, error: impl Display) -> Self {
        Self {
            path,
            algorithm,
            files: Vec::new(),
            files_size: 0,
            partial_digest: algorithm.sentinel(),
            error: Some(error.to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seals the directory with its finished children.
    ///
    /// `dirs` is sorted by name before combining, so the result does not
    /// depend on the order children finished in.
    pub fn seal(self, mut dirs: Vec<DirectoryRecord>) -> DirectoryRecord {
        if self.error.is_some() {
            return DirectoryRecord {
                path: self.path,
                size: 0,
                digest: self.algorithm.sentinel(),
                files: self.files,
                dirs,
                error: self.error,
            };
        }

        dirs.sort_by(|a, b| a.name().cmp(b.name()));

        let mut hasher = self.algorithm.hasher();
        hash_field(&mut hasher, self.partial_digest.as_bytes());
        let mut size = self.files_size;
        for dir in &dirs {
            hash_name_field(&mut hasher, dir.name());
            hash_field(&mut hasher, dir.digest.as_bytes());
            hash_u64_field(&mut hasher, dir.size);
            size += dir.size;
        }

        DirectoryRecord {
            path: self.path,
            size,
            digest: hasher.finalize(),
            files: self.files,
            dirs,
            error: None,
        }
    }
}

/// A finished directory: aggregate size and hash over everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    path: PathBuf,
    size: u64,
    digest: Digest,
    files: Vec<FileRecord>,
    dirs: Vec<DirectoryRecord>,
    error: Option<String>,
}

impl DirectoryRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &OsStr {
        entry_name(&self.path)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn dirs(&self) -> &[DirectoryRecord] {
        &self.dirs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Replaces the sealed size and hash with stored values.
    pub(crate) fn with_aggregate(mut self, size: u64, digest: Digest) -> Self {
        self.size = size;
        self.digest = digest;
        self
    }

    /// Pre-order walk over this directory and all directories below it,
    /// paired with their depth (this directory is depth 0).
    pub fn walk(&self) -> impl Iterator<Item = (usize, &DirectoryRecord)> {
        let mut stack = vec![(0usize, self)];
        std::iter::from_fn(move || {
            let (depth, dir) = stack.pop()?;
            stack.extend(dir.dirs.iter().rev().map(|d| (depth + 1, d)));
            Some((depth, dir))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// An error recorded on a node during the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeError {
    pub path: PathBuf,
    pub kind: NodeKind,
    pub message: String,
}

/// A sealed tree plus the settings it was produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTree {
    root: DirectoryRecord,
    algorithm: HashAlgorithm,
    exclusions: Vec<String>,
    created_at: DateTime<Utc>,
}

impl HashTree {
    pub fn new(
        root: DirectoryRecord,
        algorithm: HashAlgorithm,
        exclusions: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            root,
            algorithm,
            exclusions,
            created_at,
        }
    }

    pub fn root(&self) -> &DirectoryRecord {
        &self.root
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Exclusion patterns in effect for the whole tree.
    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Path of `path` relative to the tree root, `/`-separated.
    pub fn relative_path(&self, path: &Path) -> String {
        paths::relative(path, &self.root.path)
    }

    pub fn file_count(&self) -> usize {
        self.root.walk().map(|(_, d)| d.files.len()).sum()
    }

    pub fn dir_count(&self) -> usize {
        self.root.walk().count()
    }

    /// Every error recorded on a file or directory, in listing order.
    pub fn errors(&self) -> Vec<NodeError> {
        let mut errors = Vec::new();
        for (_, dir) in self.root.walk() {
            if let Some(message) = &dir.error {
                errors.push(NodeError {
                    path: dir.path.clone(),
                    kind: NodeKind::Directory,
                    message: message.clone(),
                });
            }
            for file in &dir.files {
                if let Some(message) = &file.error {
                    errors.push(NodeError {
                        path: file.path.clone(),
                        kind: NodeKind::File,
                        message: message.clone(),
                    });
                }
            }
        }
        errors
    }
}

fn entry_name(path: &Path) -> &OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}
