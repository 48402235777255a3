//! Path normalization for filesystem calls and display.

use std::path::{Component, Path, PathBuf};

/// Returns the form of `path` to hand to filesystem calls.
///
/// On Windows, absolute paths are given the `\\?\` extended-length prefix so
/// deep trees are not cut off by `MAX_PATH`. Elsewhere this is the identity.
pub fn normalize(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        use std::ffi::OsString;

        if path.is_absolute() && !path.as_os_str().to_string_lossy().starts_with(r"\\?\") {
            let mut prefixed = OsString::from(r"\\?\");
            prefixed.push(path.as_os_str());
            return PathBuf::from(prefixed);
        }
        path.to_path_buf()
    }
    #[cfg(not(windows))]
    {
        path.to_path_buf()
    }
}

/// Returns the stable form of `path` for messages and listings.
pub fn display(path: &Path) -> PathBuf {
    dunce::simplified(path).to_path_buf()
}

/// Returns `path` relative to `root` with `/` separators.
///
/// The root itself maps to the empty string. A path outside `root` is
/// returned in full, still with `/` separators.
pub fn relative(path: &Path, root: &Path) -> String {
    let stripped = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in stripped.components() {
        let part = match component {
            Component::Normal(name) => name.to_string_lossy(),
            Component::ParentDir => "..".into(),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => continue,
        };
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&part);
    }
    out
}
