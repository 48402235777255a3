use super::*;
use crate::util::hashing::Digest;
use std::fs;
use tempfile::TempDir;

fn options(concurrency: usize) -> ScanOptions {
    ScanOptions {
        concurrency,
        ..ScanOptions::default()
    }
}

fn options_excluding(concurrency: usize, exclude: &[&str]) -> ScanOptions {
    ScanOptions {
        exclude: exclude.iter().map(|p| p.to_string()).collect(),
        concurrency,
        ..ScanOptions::default()
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Builds a tree wide and deep enough that workers interleave.
fn populate_wide_tree(root: &Path) {
    for a in 0..6 {
        for b in 0..5 {
            for c in 0..3 {
                write(
                    root,
                    &format!("d{a}/e{b}/f{c}/file.txt"),
                    &format!("{a}-{b}-{c}"),
                );
            }
            write(root, &format!("d{a}/e{b}/note.md"), &"n".repeat(a * 10 + b));
            fs::create_dir_all(root.join(format!("d{a}/e{b}/empty"))).unwrap();
        }
        write(root, &format!("d{a}/top.bin"), &format!("top {a}"));
    }
    write(root, "root.txt", "root level");
}

fn find_dir<'t>(dir: &'t DirectoryRecord, name: &str) -> &'t DirectoryRecord {
    dir.dirs()
        .iter()
        .find(|d| d.name() == name)
        .unwrap_or_else(|| panic!("no directory named {name}"))
}

fn find_file<'t>(dir: &'t DirectoryRecord, name: &str) -> &'t FileRecord {
    dir.files()
        .iter()
        .find(|f| f.name() == name)
        .unwrap_or_else(|| panic!("no file named {name}"))
}

/// True when permission bits are not enforced for us (e.g. running as root),
/// which makes the unreadable-entry tests meaningless.
#[cfg(unix)]
pub(crate) fn running_as_root() -> bool {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let probe = temp.path().join("probe");
    fs::write(&probe, "x").unwrap();
    fs::set_permissions(&probe, fs::Permissions::from_mode(0o000)).unwrap();
    fs::File::open(&probe).is_ok()
}

mod failures;
