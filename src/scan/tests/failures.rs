use super::*;

#[test]
fn test_missing_root_is_fatal() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing");

    match scan(&missing, &options(2)) {
        Err(ScanError::RootNotFound(path)) => assert_eq!(path, missing),
        other => panic!("Expected RootNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_file_root_is_not_a_directory() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "plain.txt", "x");

    match scan(&temp.path().join("plain.txt"), &options(2)) {
        Err(ScanError::NotADirectory(_)) => {}
        other => panic!("Expected NotADirectory, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_pattern_is_fatal_before_scanning() {
    let temp = TempDir::new().unwrap();

    match scan(temp.path(), &options_excluding(2, &["[unclosed"])) {
        Err(ScanError::Exclude(ExcludeError::InvalidPattern { pattern, .. })) => {
            assert_eq!(pattern, "[unclosed")
        }
        other => panic!("Expected InvalidPattern, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_zero_concurrency_uses_available_cpus() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a/b/c.txt", "abc");

    let auto = scan(temp.path(), &options(0)).unwrap();
    let one = scan(temp.path(), &options(1)).unwrap();

    assert_eq!(auto.root(), one.root());
    assert!(effective_concurrency(0) >= 1);
    assert_eq!(effective_concurrency(7), 7);
}

#[test]
#[cfg(unix)]
fn test_dangling_symlink_gets_sentinel_and_parent_finalizes() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "dir/good.txt", "good");
    std::os::unix::fs::symlink("/nonexistent/target", temp.path().join("dir/broken")).unwrap();

    let tree = scan(temp.path(), &options(2)).unwrap();

    let dir = find_dir(tree.root(), "dir");
    let broken = find_file(dir, "broken");
    assert!(broken.digest().is_sentinel());
    assert_eq!(broken.size(), 0);
    assert!(broken.error().is_some());

    let good = find_file(dir, "good.txt");
    assert!(good.error().is_none());
    assert_eq!(dir.size(), 4);
    assert!(!dir.digest().is_sentinel());

    let errors = tree.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, broken.path());
}

#[test]
#[cfg(unix)]
fn test_symlinks_hash_their_target_and_are_not_followed_into() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "real/data.txt", "payload");
    std::os::unix::fs::symlink(temp.path().join("real/data.txt"), temp.path().join("file_link"))
        .unwrap();
    std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("dir_link")).unwrap();

    let tree = scan(temp.path(), &options(2)).unwrap();

    let file_link = find_file(tree.root(), "file_link");
    let target = find_file(find_dir(tree.root(), "real"), "data.txt");
    assert_eq!(file_link.digest(), target.digest());
    assert_eq!(file_link.size(), 7);

    // A link to a directory is a file entry that cannot be read as one.
    let dir_link = find_file(tree.root(), "dir_link");
    assert!(dir_link.digest().is_sentinel());
    assert_eq!(tree.root().dirs().len(), 1);
    assert_eq!(tree.dir_count(), 2);
}

#[test]
#[cfg(unix)]
fn test_unreadable_file_is_isolated() {
    use std::os::unix::fs::PermissionsExt;

    if running_as_root() {
        return;
    }

    let temp = TempDir::new().unwrap();
    write(temp.path(), "sub/locked.txt", "secret");
    write(temp.path(), "sub/open.txt", "open");
    write(temp.path(), "sibling/x", "x");
    let locked = temp.path().join("sub/locked.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let tree = scan(temp.path(), &options(4)).unwrap();

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    let sub = find_dir(tree.root(), "sub");
    let record = find_file(sub, "locked.txt");
    assert!(record.digest().is_sentinel());
    assert!(record.error().unwrap().contains("Permission denied"));
    assert_eq!(sub.size(), 4);
    assert_eq!(find_dir(tree.root(), "sibling").size(), 1);
    assert_eq!(tree.root().size(), 5);
}

#[test]
#[cfg(unix)]
fn test_unreadable_directory_contributes_sentinel() {
    use std::os::unix::fs::PermissionsExt;

    if running_as_root() {
        return;
    }

    let temp = TempDir::new().unwrap();
    write(temp.path(), "locked/inner/deep.txt", "hidden");
    write(temp.path(), "open/visible.txt", "visible");
    let locked = temp.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let first = scan(temp.path(), &options(3));
    let second = scan(temp.path(), &options(1));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let first = first.unwrap();
    let second = second.unwrap();

    let record = find_dir(first.root(), "locked");
    assert!(record.digest().is_sentinel());
    assert_eq!(record.size(), 0);
    assert!(record.dirs().is_empty());
    assert!(record.error().is_some());

    assert_eq!(find_dir(first.root(), "open").size(), 7);
    assert_eq!(first.root().size(), 7);
    assert_eq!(first.root(), second.root());

    let errors = first.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, crate::tree::NodeKind::Directory);
}

#[test]
#[cfg(unix)]
fn test_non_utf8_names_are_scanned() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    let name = OsStr::from_bytes(b"caf\xe9.txt");
    if fs::write(temp.path().join(name), "bytes").is_err() {
        // Some filesystems refuse non-UTF-8 names.
        return;
    }

    let tree = scan(temp.path(), &options(2)).unwrap();

    assert_eq!(tree.root().files()[0].name(), name);
    assert_eq!(tree.root().size(), 5);
}

#[test]
fn test_directory_gone_before_listing_seals_sentinel() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "kept/file.txt", "kept");

    let exclusions = ExclusionMatcher::empty();
    let progress = ProgressReporter::disabled();
    let (shared, _jobs, done) = Shared::new(root, HashAlgorithm::Xxh3, &exclusions, &progress);
    let unit = WorkUnit::new(
        PartialDirectory::from_files(root.to_path_buf(), HashAlgorithm::Xxh3, Vec::new()),
        None,
        vec![root.join("kept"), root.join("vanished")],
    );
    shared.pending_units.store(1, Ordering::Release);
    let task = |name: &str, slot: usize| Task {
        path: root.join(name),
        parent: Some(ParentLink {
            unit: Arc::clone(&unit),
            slot,
        }),
        position: vec![(slot + 1, 2)],
    };

    shared.process(task("kept", 0)).unwrap();
    assert!(done.try_recv().is_err());

    shared.process(task("vanished", 1)).unwrap();
    let record = done.try_recv().unwrap().unwrap();

    let vanished = find_dir(&record, "vanished");
    assert!(vanished.digest().is_sentinel());
    assert_eq!(vanished.size(), 0);
    assert!(vanished.files().is_empty());
    assert!(vanished.error().is_some());

    assert_eq!(find_dir(&record, "kept").size(), 4);
    assert_eq!(record.size(), 4);
    assert!(record.error().is_none());
    assert!(shared.finished.load(Ordering::Acquire));
    assert_eq!(shared.pending_units.load(Ordering::Acquire), 0);
}

#[test]
fn test_panicking_task_fails_the_scan() {
    use crate::progress::{Position, ProgressSink, ProgressSnapshot};

    struct PanickingSink;
    impl ProgressSink for PanickingSink {
        fn report(&self, _: &Path, _: &Position, _: &ProgressSnapshot) {
            panic!("sink failure");
        }
    }

    let temp = TempDir::new().unwrap();
    write(temp.path(), "a/one.txt", "1");
    write(temp.path(), "b/two.txt", "2");

    let reporter = ProgressReporter::with_sink(Duration::from_nanos(1), Box::new(PanickingSink));

    match scan_with_progress(temp.path(), &options(2), &reporter) {
        Err(ScanError::Protocol(ProtocolViolation::TaskPanicked { path })) => {
            assert_eq!(path, fs::canonicalize(temp.path()).unwrap());
        }
        other => panic!("Expected TaskPanicked, got {:?}", other.map(|_| ())),
    }
}
