use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};
use mirror_sync::{sync, Change, MemorySink, SyncEvent, SyncOptions, SyncReport};
use tempfile::TempDir;

struct Trees {
    _tmp: TempDir,
    source: PathBuf,
    replica: PathBuf,
}

impl Trees {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let tmp = TempDir::new().expect("tempdir");
        let source = tmp.path().join("source");
        let replica = tmp.path().join("replica");
        fs::create_dir(&source).expect("create source");
        Self {
            _tmp: tmp,
            source,
            replica,
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.source.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write source file");
    }

    fn sync(&self) -> (SyncReport, MemorySink) {
        let sink = MemorySink::new();
        let report = sync(&self.source, &self.replica, &sink, &SyncOptions::default());
        assert!(report.is_clean(), "unexpected failures: {report:?}");
        (report, sink)
    }

    fn replica_text(&self, rel: &str) -> String {
        fs::read_to_string(self.replica.join(rel)).expect("read replica file")
    }
}

fn count(changes: &[Change], pred: impl Fn(&Change) -> bool) -> usize {
    changes.iter().filter(|c| pred(c)).count()
}

/// Every file and directory under `root`, relative and sorted.
fn listing(root: &Path) -> Vec<(PathBuf, Option<Vec<u8>>)> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("read_dir") {
            let path = entry.expect("entry").path();
            let rel = path.strip_prefix(root).expect("relative").to_path_buf();
            if path.is_dir() {
                out.push((rel, None));
                stack.push(path);
            } else {
                out.push((rel, Some(fs::read(&path).expect("read"))));
            }
        }
    }
    out.sort();
    out
}

#[test]
fn new_tree_is_created_with_one_event_per_change() {
    let trees = Trees::new();
    trees.write("a/b.txt", "hello");
    fs::create_dir(&trees.replica).expect("empty replica");

    let (report, sink) = trees.sync();
    let changes = sink.changes();

    assert_eq!(trees.replica_text("a/b.txt"), "hello");
    assert!(trees.replica.join("a").is_dir());
    assert_eq!(
        count(&changes, |c| matches!(c, Change::DirectoryCreated { .. })),
        1
    );
    assert_eq!(count(&changes, |c| matches!(c, Change::FileCopied { .. })), 1);
    assert_eq!(changes.len(), 2);
    assert_eq!(report.mutations(), 2);
}

#[test]
fn missing_replica_root_is_created() {
    let trees = Trees::new();
    trees.write("top.txt", "top");

    let (report, _sink) = trees.sync();

    assert!(trees.replica.is_dir());
    assert_eq!(trees.replica_text("top.txt"), "top");
    assert_eq!(report.directories_created, 1);
}

#[test]
fn deleted_source_file_is_removed_from_replica() {
    let trees = Trees::new();
    trees.write("a/b.txt", "hello");
    trees.sync();

    fs::remove_file(trees.source.join("a/b.txt")).expect("delete source file");
    let (_report, sink) = trees.sync();
    let changes = sink.changes();

    assert!(!trees.replica.join("a/b.txt").exists());
    assert!(trees.replica.join("a").is_dir(), "source dir still exists");
    assert_eq!(changes.len(), 1);
    assert!(matches!(changes[0], Change::FileRemoved { .. }));
}

#[test]
fn changed_content_is_recopied_without_directory_events() {
    let trees = Trees::new();
    trees.write("a/b.txt", "hello");
    trees.sync();

    trees.write("a/b.txt", "world");
    let (_report, sink) = trees.sync();
    let changes = sink.changes();

    assert_eq!(trees.replica_text("a/b.txt"), "world");
    assert_eq!(changes.len(), 1);
    assert!(matches!(changes[0], Change::FileCopied { .. }));
}

#[test]
fn change_is_detected_when_length_and_mtime_match() {
    let trees = Trees::new();
    trees.write("same.txt", "aaaa");
    let pinned = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
    set_file_mtime(trees.source.join("same.txt"), pinned).expect("pin mtime");
    trees.sync();

    trees.write("same.txt", "bbbb");
    set_file_mtime(trees.source.join("same.txt"), pinned).expect("pin mtime again");
    let replica_mtime =
        FileTime::from_last_modification_time(&fs::metadata(trees.replica.join("same.txt")).unwrap());
    assert_eq!(replica_mtime, pinned, "mtime carried over on first copy");

    let (report, _sink) = trees.sync();

    assert_eq!(report.files_copied, 1);
    assert_eq!(trees.replica_text("same.txt"), "bbbb");
}

#[test]
fn identical_file_is_not_recopied() {
    let trees = Trees::new();
    trees.write("keep.txt", "stable");
    fs::create_dir(&trees.replica).unwrap();
    fs::write(trees.replica.join("keep.txt"), "stable").unwrap();
    let old = FileTime::from_unix_time(1_500_000_000, 0);
    set_file_mtime(trees.replica.join("keep.txt"), old).unwrap();

    let (report, sink) = trees.sync();

    assert_eq!(report.files_unchanged, 1);
    assert!(sink.changes().is_empty());
    let mtime =
        FileTime::from_last_modification_time(&fs::metadata(trees.replica.join("keep.txt")).unwrap());
    assert_eq!(mtime, old, "untouched file keeps its mtime");
}

#[test]
fn second_pass_is_a_no_op() {
    let trees = Trees::new();
    trees.write("a/b.txt", "hello");
    trees.write("a/c/d.bin", "\u{0}\u{1}\u{2}");
    trees.write("root.txt", "root");
    fs::create_dir_all(trees.source.join("empty/dir")).unwrap();

    let (first, _) = trees.sync();
    assert!(first.mutations() > 0);

    let (second, sink) = trees.sync();
    assert_eq!(second.mutations(), 0);
    assert!(sink.changes().is_empty());
    assert_eq!(second.files_unchanged, 3);
}

#[test]
fn replica_converges_to_source() {
    let trees = Trees::new();
    trees.write("docs/readme.md", "# readme");
    trees.write("docs/deep/nested/file.txt", "nested");
    trees.write("bin/blob", &"x".repeat(200_000));
    fs::create_dir_all(trees.source.join("empty")).unwrap();

    fs::create_dir_all(trees.replica.join("docs")).unwrap();
    fs::write(trees.replica.join("docs/readme.md"), "stale readme").unwrap();
    fs::create_dir_all(trees.replica.join("junk/more")).unwrap();
    fs::write(trees.replica.join("junk/more/old.txt"), "old").unwrap();
    fs::write(trees.replica.join("stray.txt"), "stray").unwrap();

    trees.sync();

    assert_eq!(listing(&trees.replica), listing(&trees.source));
}

#[test]
fn staging_names_never_clobber_source_files() {
    let trees = Trees::new();
    for n in 0..20 {
        trees.write(&format!("f{n}.txt"), &format!("plain {n}"));
        trees.write(&format!("f{n}.txt.mirror.tmp"), &format!("lookalike {n}"));
        trees.write(&format!(".mirror-{n}.tmp"), &format!("prefixed {n}"));
    }

    let (first, _) = trees.sync();
    assert_eq!(first.files_copied, 60);
    assert_eq!(listing(&trees.replica), listing(&trees.source));

    let (second, sink) = trees.sync();
    assert_eq!(second.mutations(), 0);
    assert!(sink.changes().is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_directory_names_are_mirrored() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let trees = Trees::new();
    let odd = OsStr::from_bytes(b"bad\xffdir");
    fs::create_dir(trees.source.join(odd)).expect("create odd dir");
    fs::write(trees.source.join(odd).join("a.txt"), "hi").expect("write");

    let (report, _) = trees.sync();

    assert_eq!(report.files_copied, 1);
    assert_eq!(
        fs::read_to_string(trees.replica.join(odd).join("a.txt")).expect("mirrored file"),
        "hi"
    );
    let (second, _) = trees.sync();
    assert_eq!(second.mutations(), 0);
}

#[test]
fn orphan_directories_are_pruned_bottom_up() {
    let trees = Trees::new();
    fs::create_dir_all(trees.replica.join("gone/deeper")).unwrap();
    fs::write(trees.replica.join("gone/deeper/x.txt"), "x").unwrap();
    fs::write(trees.replica.join("gone/y.txt"), "y").unwrap();

    let (report, sink) = trees.sync();

    assert!(!trees.replica.join("gone").exists());
    assert_eq!(report.files_removed, 2);
    assert_eq!(report.directories_removed, 2);

    let removed: Vec<_> = sink
        .changes()
        .into_iter()
        .filter_map(|c| match c {
            Change::FileRemoved { path } | Change::DirectoryRemoved { path } => Some(path),
            _ => None,
        })
        .collect();
    let pos = |suffix: &str| {
        removed
            .iter()
            .position(|p| p.ends_with(suffix))
            .expect("removal logged")
    };
    assert!(pos("gone/deeper/x.txt") < pos("gone/deeper"));
    assert!(pos("gone/deeper") < pos("gone"));
    assert!(pos("gone/y.txt") < pos("gone"));
}

#[test]
fn run_started_and_completed_bracket_every_pass() {
    let trees = Trees::new();
    trees.write("a.txt", "a");

    let (_report, sink) = trees.sync();
    let events = sink.events();

    assert!(matches!(events.first(), Some(SyncEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(SyncEvent::RunCompleted(_))));
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_reported_and_the_rest_still_syncs() {
    use std::os::unix::fs::PermissionsExt;

    let trees = Trees::new();
    trees.write("ok.txt", "fine");
    trees.write("locked.txt", "secret");
    let locked = trees.source.join("locked.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked).is_ok() {
        // Running as root: permissions are not enforced.
        return;
    }

    let sink = MemorySink::new();
    let report = sync(&trees.source, &trees.replica, &sink, &SyncOptions::default());

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert!(report.aborted.is_none());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("locked.txt"));
    assert_eq!(trees.replica_text("ok.txt"), "fine");
    assert_eq!(sink.messages_at(tracing::Level::Error).len(), 1);
}

#[cfg(unix)]
#[test]
fn unreadable_subdirectory_is_skipped_and_reported() {
    use std::os::unix::fs::PermissionsExt;

    let trees = Trees::new();
    trees.write("open/a.txt", "a");
    trees.write("closed/b.txt", "b");
    let closed = trees.source.join("closed");
    fs::set_permissions(&closed, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&closed).is_ok() {
        fs::set_permissions(&closed, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let sink = MemorySink::new();
    let report = sync(&trees.source, &trees.replica, &sink, &SyncOptions::default());

    fs::set_permissions(&closed, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(report.aborted.is_none());
    assert!(!report.failures.is_empty());
    assert_eq!(trees.replica_text("open/a.txt"), "a");
}
