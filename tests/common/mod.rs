use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::fs;
use std::path::Path;

// Each integration test file is compiled as its own crate, so not every
// helper is used by every file.
#[allow(dead_code)]
pub fn treehash_cmd(cwd: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("treehash");
    cmd.arg("-C").arg(cwd);
    cmd
}

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[allow(dead_code)]
pub fn populate_sample(root: &Path) {
    write(root, "a.txt", "abc");
    write(root, "sub/b.txt", "x");
    write(root, "sub/deep/c.txt", "hello world");
    write(root, "logs/run.log", "noise");
}

/// Scans `dir` and saves a snapshot to `snapshot`.
#[allow(dead_code)]
pub fn save_snapshot(dir: &Path, snapshot: &Path, extra: &[&str]) {
    cargo_bin_cmd!("treehash")
        .arg("scan")
        .arg(dir)
        .arg("--snapshot")
        .arg(snapshot)
        .args(extra)
        .assert()
        .success();
}
