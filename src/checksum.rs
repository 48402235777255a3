use crate::util::hashing::{Digest, HashAlgorithm};
use std::fs::{File, Metadata};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read buffer size when the filesystem does not report a preferred I/O size.
const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("File modified during checksumming: {0}")]
    ConcurrentModification(PathBuf),
}

pub struct FileChecksum {
    pub digest: Digest,
    /// File size in bytes, captured after checksumming.
    pub size: u64,
}

/// Computes the digest of a file's contents with concurrent modification detection.
///
/// # Behavior
/// - Follows symlinks and records the target's modification time
/// - Refuses anything that is not a regular file (directories, FIFOs, devices)
/// - Reads the file in chunks of the filesystem's preferred I/O size
/// - Verifies the modification time hasn't changed after reading
///
/// Peak memory is one chunk regardless of file size.
///
/// # Errors
/// - `ChecksumError::Io`: File doesn't exist or other I/O errors
/// - `ChecksumError::PermissionDenied`: Insufficient permissions to read the file
/// - `ChecksumError::NotAFile`: The path (or a symlink's target) is not a regular file
/// - `ChecksumError::ConcurrentModification`: File was detected as being modified while
///   checksumming. Note that the absence of this error is *not* a guarantee that the
///   file was *not* modified.
pub fn checksum_file(path: &Path, algorithm: HashAlgorithm) -> Result<FileChecksum, ChecksumError> {
    debug!("Checksumming {}", path.display());

    // Checked before opening: opening a FIFO would block until a writer appears.
    let metadata_before = std::fs::metadata(path).map_err(|e| map_io(e, path))?;
    if !metadata_before.is_file() {
        return Err(ChecksumError::NotAFile(path.to_path_buf()));
    }
    let mtime_before = metadata_before.modified().map_err(ChecksumError::Io)?;

    let mut file = File::open(path).map_err(|e| map_io(e, path))?;

    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; chunk_size(&metadata_before)];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(map_io(e, path)),
        };
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let metadata_after = file.metadata().map_err(ChecksumError::Io)?;
    let mtime_after = metadata_after.modified().map_err(ChecksumError::Io)?;

    if mtime_before != mtime_after {
        return Err(ChecksumError::ConcurrentModification(path.to_path_buf()));
    }

    let digest = hasher.finalize();

    debug!("Checksum of {} is {}", path.display(), digest);

    Ok(FileChecksum {
        digest,
        size: metadata_after.len(),
    })
}

fn map_io(e: std::io::Error, path: &Path) -> ChecksumError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ChecksumError::PermissionDenied(path.to_path_buf())
    } else {
        ChecksumError::Io(e)
    }
}

#[cfg(unix)]
fn chunk_size(metadata: &Metadata) -> usize {
    use std::os::unix::fs::MetadataExt;

    match usize::try_from(metadata.blksize()) {
        Ok(0) | Err(_) => DEFAULT_CHUNK_SIZE,
        Ok(n) => n,
    }
}

#[cfg(not(unix))]
fn chunk_size(_metadata: &Metadata) -> usize {
    DEFAULT_CHUNK_SIZE
}
