//! Engine behavior against a directory-backed fake remote.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use upsync_engine::{FileSyncer, SyncEngine, SyncError, SyncOutcome, TransferTask};
use upsync_test_support::FakeRemote;

const MIN_FREE: u64 = 1_000_000;

struct Fixture {
    local: TempDir,
    _remote_root: TempDir,
    remote: FakeRemote,
}

impl Fixture {
    fn new() -> Self {
        let local = TempDir::new().expect("local tempdir");
        let remote_root = TempDir::new().expect("remote tempdir");
        let remote = FakeRemote::new(remote_root.path());
        Self {
            local,
            _remote_root: remote_root,
            remote,
        }
    }

    fn write_local(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.local.path().join(name);
        fs::write(&path, content).expect("write local file");
        path
    }

    fn task(&self, local: PathBuf, size: u64, dir: &str, filename: &str) -> TransferTask {
        TransferTask {
            local_path: local,
            size,
            remote_dir: PathBuf::from(dir),
            remote_filename: filename.to_owned(),
        }
    }
}

fn engine() -> SyncEngine {
    SyncEngine::new(MIN_FREE)
}

#[test]
fn full_transfer_lands_under_final_name() {
    let mut fx = Fixture::new();
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::Transferred(6));
    assert_eq!(fx.remote.read(Path::new("world")).expect("read"), b"hello\n");
    assert!(!fx.remote.exists(Path::new(".world.synctmp")));
}

#[test]
fn missing_directories_are_created_parent_first() {
    let mut fx = Fixture::new();
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "in/ner", "world");

    engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert!(fx.remote.resolve(Path::new("in")).is_dir());
    assert!(fx.remote.resolve(Path::new("in/ner")).is_dir());
    assert_eq!(
        fx.remote.read(Path::new("in/ner/world")).expect("read"),
        b"hello\n"
    );
}

#[test]
fn file_in_place_of_directory_segment_fails() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new("inner"), b"my\n").expect("seed");
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "inner", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("conflict");
    assert!(matches!(err, SyncError::DirectoryCreation { .. }));
    assert_eq!(fx.remote.read(Path::new("inner")).expect("read"), b"my\n");
    assert!(!fx.remote.exists(Path::new("inner/world")));
}

#[test]
fn missing_remote_base_fails_without_side_effects() {
    let fx = Fixture::new();
    let mut remote = FakeRemote::new(fx._remote_root.path().join("gone"));
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    let err = engine().sync_file(&mut remote, &task).expect_err("no base");
    assert!(matches!(err, SyncError::DirectoryCreation { .. }));
}

#[test]
fn existing_final_with_same_content_is_skipped() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new("world"), b"my\n").expect("seed");
    let local = fx.write_local("src", b"my\n");
    let task = fx.task(local, 3, "", "world");

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::AlreadySynced);
    assert_eq!(fx.remote.bytes_written, 0);
}

#[test]
fn divergent_content_with_same_size_is_a_conflict() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new("world"), b"my\n").expect("seed");
    let local = fx.write_local("src", b"hi\n");
    let task = fx.task(local, 3, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("conflict");
    assert!(matches!(err, SyncError::DestinationConflict { .. }));
    assert_eq!(fx.remote.read(Path::new("world")).expect("read"), b"my\n");
}

#[test]
fn size_mismatch_at_final_is_a_conflict() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new("world"), b"my\nhello\n").expect("seed");
    let local = fx.write_local("src", b"my\n");
    let task = fx.task(local, 3, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("conflict");
    assert!(matches!(err, SyncError::DestinationConflict { .. }));
    assert_eq!(
        fx.remote.read(Path::new("world")).expect("read"),
        b"my\nhello\n"
    );
}

#[test]
fn matching_staging_prefix_is_resumed() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new(".world.synctmp"), b"my\n").expect("seed");
    let local = fx.write_local("src", b"my\nhello\n");
    let task = fx.task(local, 9, "", "world");

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::Transferred(6));
    assert_eq!(
        fx.remote.read(Path::new("world")).expect("read"),
        b"my\nhello\n"
    );
    assert!(!fx.remote.exists(Path::new(".world.synctmp")));
}

#[test]
fn fully_staged_file_is_committed_without_appending() {
    let mut fx = Fixture::new();
    fx.remote
        .seed(Path::new(".world.synctmp"), b"my\nhello\n")
        .expect("seed");
    let local = fx.write_local("src", b"my\nhello\n");
    let task = fx.task(local, 9, "", "world");

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::Transferred(0));
    assert_eq!(fx.remote.bytes_written, 0);
    assert_eq!(
        fx.remote.read(Path::new("world")).expect("read"),
        b"my\nhello\n"
    );
    assert!(!fx.remote.exists(Path::new(".world.synctmp")));
}

#[test]
fn empty_staging_file_is_resumed_from_byte_zero() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new(".world.synctmp"), b"").expect("seed");
    let local = fx.write_local("src", b"my\nhello\n");
    let task = fx.task(local, 9, "", "world");

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::Transferred(9));
    assert_eq!(
        fx.remote.read(Path::new("world")).expect("read"),
        b"my\nhello\n"
    );
}

#[test]
fn divergent_staging_prefix_falls_back_to_full_transfer() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new(".world.synctmp"), b"xx\n").expect("seed");
    let local = fx.write_local("src", b"my\nhello\n");
    let task = fx.task(local, 9, "", "world");

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::Transferred(9));
    assert_eq!(
        fx.remote.read(Path::new("world")).expect("read"),
        b"my\nhello\n"
    );
}

#[test]
fn oversized_staging_falls_back_to_full_transfer() {
    let mut fx = Fixture::new();
    fx.remote
        .seed(Path::new(".world.synctmp"), b"my\nhello\nmore\n")
        .expect("seed");
    let local = fx.write_local("src", b"my\n");
    let task = fx.task(local, 3, "", "world");

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::Transferred(3));
    assert_eq!(fx.remote.read(Path::new("world")).expect("read"), b"my\n");
}

#[test]
fn short_local_source_fails_hard_during_resume() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new(".world.synctmp"), b"my\n").expect("seed");
    // The walk saw 9 bytes, but the file has since been truncated below the
    // staging prefix length.
    let local = fx.write_local("src", b"m");
    let task = fx.task(local, 9, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("short read");
    assert!(matches!(err, SyncError::LocalReadShort { .. }));
    assert_eq!(
        fx.remote.read(Path::new(".world.synctmp")).expect("read"),
        b"my\n"
    );
    assert!(!fx.remote.exists(Path::new("world")));
}

#[test]
fn staging_directory_is_a_conflict() {
    let mut fx = Fixture::new();
    fs::create_dir(fx.remote.resolve(Path::new(".world.synctmp"))).expect("mkdir");
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("conflict");
    assert!(matches!(err, SyncError::DestinationConflict { .. }));
}

#[test]
fn full_transfer_respects_minimum_free_space() {
    let mut fx = Fixture::new();
    fx.remote.space_free = 100_000;
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("no space");
    assert!(matches!(err, SyncError::SpacePreflight { .. }));
    assert!(!fx.remote.exists(Path::new("world")));
    assert!(!fx.remote.exists(Path::new(".world.synctmp")));
    assert_eq!(fx.remote.bytes_written, 0);
}

#[test]
fn full_transfer_fails_one_byte_under_the_limit() {
    let mut fx = Fixture::new();
    fx.remote.space_free = MIN_FREE + 5;
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("no space");
    assert!(matches!(err, SyncError::SpacePreflight { .. }));
}

#[test]
fn full_transfer_proceeds_exactly_at_the_limit() {
    let mut fx = Fixture::new();
    fx.remote.space_free = MIN_FREE + 6;
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(fx.remote.read(Path::new("world")).expect("read"), b"hello\n");
}

#[test]
fn resume_counts_staged_bytes_as_reclaimed_space() {
    let mut fx = Fixture::new();
    fx.remote.seed(Path::new(".world.synctmp"), b"my\n").expect("seed");
    let local = fx.write_local("src", b"my\nhello\n");
    let task = fx.task(local, 9, "", "world");

    // 1_000_002 free + 3 staged < 9 + min_free: refused before any append.
    fx.remote.space_free = MIN_FREE + 2;
    let err = engine().sync_file(&mut fx.remote, &task).expect_err("no space");
    assert!(matches!(err, SyncError::SpacePreflight { .. }));
    assert_eq!(
        fx.remote.read(Path::new(".world.synctmp")).expect("read"),
        b"my\n"
    );
    assert!(!fx.remote.exists(Path::new("world")));

    // 1_000_006 free + 3 staged == 9 + min_free: proceeds.
    fx.remote.space_free = MIN_FREE + 6;
    let outcome = engine().sync_file(&mut fx.remote, &task).expect("sync");
    assert_eq!(outcome, SyncOutcome::Transferred(6));
    assert_eq!(
        fx.remote.read(Path::new("world")).expect("read"),
        b"my\nhello\n"
    );
}

#[test]
fn short_write_leaves_staging_for_inspection() {
    let mut fx = Fixture::new();
    fx.remote.put_limit = Some(3);
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("short write");
    assert!(matches!(err, SyncError::TransferIncomplete { .. }));
    assert_eq!(
        fx.remote.read(Path::new(".world.synctmp")).expect("read"),
        b"hel"
    );
    assert!(!fx.remote.exists(Path::new("world")));
}

#[test]
fn rename_failure_keeps_staging_and_no_final() {
    let mut fx = Fixture::new();
    fx.remote.fail_renames = true;
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    let err = engine().sync_file(&mut fx.remote, &task).expect_err("rename");
    assert!(matches!(err, SyncError::Transport(_)));
    assert_eq!(
        fx.remote.read(Path::new(".world.synctmp")).expect("read"),
        b"hello\n"
    );
    assert!(!fx.remote.exists(Path::new("world")));
}

#[test]
fn second_sync_of_unchanged_file_moves_no_bytes() {
    let mut fx = Fixture::new();
    let local = fx.write_local("src", b"hello\n");
    let task = fx.task(local, 6, "", "world");

    engine().sync_file(&mut fx.remote, &task).expect("first sync");
    let moved = fx.remote.bytes_written;

    let outcome = engine().sync_file(&mut fx.remote, &task).expect("second sync");
    assert_eq!(outcome, SyncOutcome::AlreadySynced);
    assert_eq!(fx.remote.bytes_written, moved);
}
