//! Digest primitives and canonical field encodings for tree hashes.
//!
//! File contents are streamed through a [`StreamHasher`]; directory hashes are
//! built from length-prefixed fields so that distinct sequences of
//! `(name, digest, size)` never serialize to identical byte streams.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::ffi::OsStr;
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Digest algorithm used for file contents and every combination hash.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// XXH3 with 128-bit output. Fast, non-cryptographic; change detection only.
    #[default]
    Xxh3,
    /// SHA-256, for when the snapshots themselves are not trusted.
    Sha256,
}

impl HashAlgorithm {
    /// Width of a digest produced by this algorithm, in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Xxh3 => 16,
            HashAlgorithm::Sha256 => 32,
        }
    }

    pub fn hasher(self) -> StreamHasher {
        match self {
            HashAlgorithm::Xxh3 => StreamHasher::Xxh3(Box::new(Xxh3::new())),
            HashAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
        }
    }

    /// The placeholder digest used for unreadable files and directories.
    ///
    /// All zero bytes, at the algorithm's output width.
    pub fn sentinel(self) -> Digest {
        Digest(vec![0u8; self.digest_len()].into_boxed_slice())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Xxh3 => "xxh3",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental hasher over one of the supported algorithms.
pub enum StreamHasher {
    Xxh3(Box<Xxh3>),
    Sha256(Sha256),
}

impl StreamHasher {
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            StreamHasher::Xxh3(h) => h.update(bytes),
            StreamHasher::Sha256(h) => h.update(bytes),
        }
    }

    pub fn finalize(self) -> Digest {
        let bytes: Box<[u8]> = match self {
            StreamHasher::Xxh3(h) => h.digest128().to_be_bytes().to_vec().into_boxed_slice(),
            StreamHasher::Sha256(h) => h.finalize().to_vec().into_boxed_slice(),
        };
        Digest(bytes)
    }
}

/// An owned digest value. Displays as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest(Box<[u8]>);

impl Digest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        Ok(Digest(hex::decode(text)?.into_boxed_slice()))
    }

    /// True for the all-zero placeholder digest.
    pub fn is_sentinel(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Hashes a byte field with an explicit length prefix.
///
/// Length-prefixing avoids delimiter ambiguities (for example a file named
/// `a` followed by one named `bc` versus `ab` followed by `c`).
pub(crate) fn hash_field(hasher: &mut StreamHasher, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    hasher.update(&len.to_be_bytes());
    hasher.update(bytes);
}

/// Hashes a fixed-width integer field.
pub(crate) fn hash_u64_field(hasher: &mut StreamHasher, value: u64) {
    hasher.update(&value.to_be_bytes());
}

/// Hashes an entry name while preserving platform identity semantics.
///
/// On Unix we hash raw OS bytes so distinct non-UTF-8 names remain distinct.
/// Elsewhere we fall back to the string form.
pub(crate) fn hash_name_field(hasher: &mut StreamHasher, name: &OsStr) {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        hash_field(hasher, name.as_bytes());
    }
    #[cfg(not(unix))]
    {
        hash_field(hasher, name.to_string_lossy().as_bytes());
    }
}
