//! Persisted form of a [`HashTree`].
//!
//! A snapshot is a TOML document with a `[metadata]` table and one flat
//! `entries` table keyed by root-relative path, `"."` being the root:
//!
//! ```toml
//! [metadata]
//! version = 1
//! algorithm = "xxh3"
//! root = "/data/photos"
//! exclude = ['.*\.tmp$']
//! created = "2024-01-01T12:00:00+00:00"
//!
//! [entries."."]
//! type = "dir"
//! size = 4
//! hash = "..."
//!
//! [entries."a.txt"]
//! type = "file"
//! size = 3
//! hash = "..."
//! ```

use crate::listing::{OutputWriteError, write_atomic};
use crate::tree::{DirectoryRecord, FileRecord, HashTree, PartialDirectory};
use crate::util::hashing::{Digest, HashAlgorithm};
use crate::util::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

const ROOT_KEY: &str = ".";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    Write(#[from] OutputWriteError),
    #[error("Invalid creation timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("Snapshot has no root entry")]
    MissingRoot,
    #[error("Entry {0:?} has no parent directory entry")]
    MissingParent(String),
    #[error("Invalid hash for entry {key:?}: {reason}")]
    InvalidHash { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", deny_unknown_fields)]
pub enum SnapshotEntry {
    #[serde(rename = "file")]
    File {
        size: u64,
        hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "dir")]
    Dir {
        size: u64,
        hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl SnapshotEntry {
    fn is_dir(&self) -> bool {
        matches!(self, SnapshotEntry::Dir { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Metadata {
    version: u32,
    algorithm: HashAlgorithm,
    root: String,
    #[serde(default)]
    exclude: Vec<String>,
    created: String,
}

/// Only the version, so a newer snapshot is reported as such instead of as
/// a parse error on whatever changed.
#[derive(Debug, Deserialize)]
struct VersionOnly {
    metadata: Version,
}

#[derive(Debug, Deserialize)]
struct Version {
    version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    metadata: Metadata,
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl Snapshot {
    const SUPPORTED_VERSION: u32 = 1;

    pub fn from_tree(tree: &HashTree) -> Self {
        let mut entries = BTreeMap::new();

        for (_, dir) in tree.root().walk() {
            let key = entry_key(tree, dir.path());
            insert_entry(
                &mut entries,
                key,
                SnapshotEntry::Dir {
                    size: dir.size(),
                    hash: dir.digest().to_hex(),
                    error: dir.error().map(str::to_string),
                },
            );
            for file in dir.files() {
                insert_entry(
                    &mut entries,
                    entry_key(tree, file.path()),
                    SnapshotEntry::File {
                        size: file.size(),
                        hash: file.digest().to_hex(),
                        error: file.error().map(str::to_string),
                    },
                );
            }
        }

        Snapshot {
            metadata: Metadata {
                version: Self::SUPPORTED_VERSION,
                algorithm: tree.algorithm(),
                root: paths::display(tree.root().path()).to_string_lossy().into_owned(),
                exclude: tree.exclusions().to_vec(),
                created: tree.created_at().to_rfc3339(),
            },
            entries,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.metadata.algorithm
    }

    pub fn from_toml(content: &str) -> Result<Self, SnapshotError> {
        let version: VersionOnly = toml::from_str(content)?;
        if version.metadata.version != Self::SUPPORTED_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version.metadata.version));
        }

        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, SnapshotError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                SnapshotError::PermissionDenied(path.to_path_buf())
            } else {
                SnapshotError::Io(e)
            }
        })?;

        Self::from_toml(&content)
    }

    /// Saves the snapshot atomically.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let content = self.to_toml()?;
        write_atomic(path, content.as_bytes())?;
        Ok(())
    }

    /// Rebuilds the tree.
    ///
    /// Directory hashes are recomputed from their children. Where that does
    /// not reproduce the stored value (a hand-edited snapshot, or names that
    /// were not valid UTF-8 when saved) the stored value wins and a warning
    /// is logged.
    pub fn to_tree(&self) -> Result<HashTree, SnapshotError> {
        let created = DateTime::parse_from_rfc3339(&self.metadata.created)
            .map_err(|_| SnapshotError::InvalidTimestamp(self.metadata.created.clone()))?
            .with_timezone(&Utc);

        let mut children: BTreeMap<&str, Vec<(&str, &SnapshotEntry)>> = BTreeMap::new();
        for (key, entry) in &self.entries {
            if key == ROOT_KEY {
                continue;
            }
            let (parent, name) = match key.rsplit_once('/') {
                Some((parent, name)) => (parent, name),
                None => (ROOT_KEY, key.as_str()),
            };
            if !self.entries.get(parent).is_some_and(SnapshotEntry::is_dir) {
                return Err(SnapshotError::MissingParent(key.clone()));
            }
            children.entry(parent).or_default().push((name, entry));
        }

        let root_entry = match self.entries.get(ROOT_KEY) {
            Some(entry @ SnapshotEntry::Dir { .. }) => entry,
            _ => return Err(SnapshotError::MissingRoot),
        };

        let builder = Rebuilder {
            algorithm: self.metadata.algorithm,
            children: &children,
        };
        let root = builder.directory(ROOT_KEY, PathBuf::from(&self.metadata.root), root_entry)?;

        Ok(HashTree::new(
            root,
            self.metadata.algorithm,
            self.metadata.exclude.clone(),
            created,
        ))
    }
}

struct Rebuilder<'a> {
    algorithm: HashAlgorithm,
    children: &'a BTreeMap<&'a str, Vec<(&'a str, &'a SnapshotEntry)>>,
}

impl Rebuilder<'_> {
    fn directory(
        &self,
        key: &str,
        path: PathBuf,
        entry: &SnapshotEntry,
    ) -> Result<DirectoryRecord, SnapshotError> {
        let SnapshotEntry::Dir { size, hash, error } = entry else {
            return Err(SnapshotError::MissingParent(key.to_string()));
        };
        let stored = self.digest(key, hash)?;

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for (name, child) in self.children.get(key).into_iter().flatten() {
            let child_key = match key {
                ROOT_KEY => name.to_string(),
                _ => format!("{key}/{name}"),
            };
            let child_path = path.join(name);
            match child {
                SnapshotEntry::File { size, hash, error } => files.push(FileRecord::from_parts(
                    child_path,
                    *size,
                    self.digest(&child_key, hash)?,
                    error.clone(),
                )),
                SnapshotEntry::Dir { .. } => {
                    dirs.push(self.directory(&child_key, child_path, child)?)
                }
            }
        }

        let partial = match error {
            Some(message) => PartialDirectory::unreadable(path, self.algorithm, message),
            None => PartialDirectory::from_files(path, self.algorithm, files),
        };
        let sealed = partial.seal(dirs);

        if sealed.size() != *size || sealed.digest() != &stored {
            warn!(
                "Snapshot entry {:?} does not match its contents; keeping the stored hash",
                key
            );
            return Ok(sealed.with_aggregate(*size, stored));
        }
        Ok(sealed)
    }

    fn digest(&self, key: &str, hash: &str) -> Result<Digest, SnapshotError> {
        let digest = Digest::from_hex(hash).map_err(|e| SnapshotError::InvalidHash {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        if digest.as_bytes().len() != self.algorithm.digest_len() {
            return Err(SnapshotError::InvalidHash {
                key: key.to_string(),
                reason: format!(
                    "expected {} bytes for {}, got {}",
                    self.algorithm.digest_len(),
                    self.algorithm,
                    digest.as_bytes().len()
                ),
            });
        }
        Ok(digest)
    }
}

fn entry_key(tree: &HashTree, path: &Path) -> String {
    match tree.relative_path(path) {
        relative if relative.is_empty() => ROOT_KEY.to_string(),
        relative => relative,
    }
}

fn insert_entry(entries: &mut BTreeMap<String, SnapshotEntry>, key: String, entry: SnapshotEntry) {
    if entries.contains_key(&key) {
        warn!("Two entries map to {:?} in the snapshot; keeping the first", key);
        return;
    }
    entries.insert(key, entry);
}

/// Writes `tree` to `path` as a snapshot.
pub fn save_tree(tree: &HashTree, path: &Path) -> Result<(), SnapshotError> {
    Snapshot::from_tree(tree).save(path)
}

pub fn load_tree(path: &Path) -> Result<HashTree, SnapshotError> {
    Snapshot::load(path)?.to_tree()
}
