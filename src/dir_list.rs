//! Non-recursive directory listing.
//!
//! Lists the immediate children of one directory, drops excluded entries and
//! splits the rest into files and subdirectories, each sorted by raw name.
//! Symlinks are always listed as files so the scan never follows them into
//! another part of the filesystem.

use crate::exclude::ExclusionMatcher;
use crate::util::paths;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DirListError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: OsString,
    pub path: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<ListedEntry>,
    pub dirs: Vec<ListedEntry>,
}

/// Lists `dir`, which must lie under `root`.
///
/// Every child is tested against `exclusions` using its path relative to
/// `root`, before it is classified. Both output lists are sorted by name in
/// byte order, independent of the order the filesystem returns entries in.
pub fn list_directory(
    dir: &Path,
    root: &Path,
    exclusions: &ExclusionMatcher,
) -> Result<Listing, DirListError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| map_io(e, dir))?;

    let mut listing = Listing::default();

    for entry in read_dir {
        let entry = entry.map_err(|e| map_io(e, dir))?;
        let path = entry.path();

        if exclusions.matches(&paths::relative(&path, root)) {
            continue;
        }

        // file_type() does not follow symlinks.
        let file_type = entry.file_type().map_err(|e| map_io(e, &path))?;

        let listed = ListedEntry {
            name: entry.file_name(),
            path,
        };

        if file_type.is_dir() {
            listing.dirs.push(listed);
        } else {
            listing.files.push(listed);
        }
    }

    listing.files.sort_by(|a, b| a.name.cmp(&b.name));
    listing.dirs.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(listing)
}

fn map_io(e: std::io::Error, path: &Path) -> DirListError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        DirListError::PermissionDenied(path.to_path_buf())
    } else {
        DirListError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(entries: &[ListedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.to_str().unwrap()).collect()
    }

    #[test]
    fn test_list_simple_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("file1.txt"), "content1").unwrap();
        fs::write(root.join("file2.txt"), "content2").unwrap();
        fs::create_dir(root.join("dir1")).unwrap();
        fs::write(root.join("dir1/file3.txt"), "content3").unwrap();

        let listing = list_directory(root, root, &ExclusionMatcher::empty()).unwrap();

        assert_eq!(names(&listing.files), ["file1.txt", "file2.txt"]);
        assert_eq!(names(&listing.dirs), ["dir1"]);
        assert_eq!(listing.dirs[0].path, root.join("dir1"));

        let sub = list_directory(&root.join("dir1"), root, &ExclusionMatcher::empty()).unwrap();
        assert_eq!(names(&sub.files), ["file3.txt"]);
        assert!(sub.dirs.is_empty());
    }

    #[test]
    fn test_list_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let listing =
            list_directory(temp_dir.path(), temp_dir.path(), &ExclusionMatcher::empty()).unwrap();

        assert_eq!(listing, Listing::default());
    }

    #[test]
    fn test_list_deterministic_ordering() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("zebra.txt"), "z").unwrap();
        fs::write(root.join("apple.txt"), "a").unwrap();
        fs::write(root.join("Banana.txt"), "b").unwrap();
        fs::create_dir(root.join("zdir")).unwrap();
        fs::create_dir(root.join("adir")).unwrap();

        let listing = list_directory(root, root, &ExclusionMatcher::empty()).unwrap();

        // Byte order puts uppercase before lowercase.
        assert_eq!(names(&listing.files), ["Banana.txt", "apple.txt", "zebra.txt"]);
        assert_eq!(names(&listing.dirs), ["adir", "zdir"]);
    }

    #[test]
    fn test_list_applies_exclusions_with_root_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub/keep.txt"), "k").unwrap();
        fs::write(root.join("sub/drop.log"), "d").unwrap();
        fs::create_dir(root.join("sub/cache")).unwrap();

        let exclusions = ExclusionMatcher::new([r"sub/.*\.log", "sub/cache"]).unwrap();
        let listing = list_directory(&root.join("sub"), root, &exclusions).unwrap();

        assert_eq!(names(&listing.files), ["keep.txt"]);
        assert!(listing.dirs.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_list_symlinks_are_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link_to_dir")).unwrap();
        std::os::unix::fs::symlink("/nonexistent/target", root.join("broken_link")).unwrap();

        let listing = list_directory(root, root, &ExclusionMatcher::empty()).unwrap();

        assert_eq!(names(&listing.files), ["broken_link", "link_to_dir"]);
        assert_eq!(names(&listing.dirs), ["real"]);
    }

    #[test]
    fn test_list_nonexistent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let result = list_directory(&missing, temp_dir.path(), &ExclusionMatcher::empty());

        match result {
            Err(DirListError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected NotFound IO error"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_list_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        if crate::scan::tests::running_as_root() {
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let restricted_dir = temp_dir.path().join("restricted");
        fs::create_dir(&restricted_dir).unwrap();

        let mut perms = fs::metadata(&restricted_dir).unwrap().permissions();
        perms.set_mode(0o000);
        fs::set_permissions(&restricted_dir, perms.clone()).unwrap();

        let result = list_directory(&restricted_dir, temp_dir.path(), &ExclusionMatcher::empty());

        perms.set_mode(0o755);
        fs::set_permissions(&restricted_dir, perms).unwrap();

        match result {
            Err(DirListError::PermissionDenied(_)) => {}
            _ => panic!("Expected PermissionDenied error"),
        }
    }
}
