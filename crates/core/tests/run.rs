//! End-to-end runs over a directory-backed fake remote.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use upsync_core::{run_job_with, JobConfig, RunError, RunLock};
use upsync_test_support::FakeRemote;

struct Fixture {
    _dir: TempDir,
    job: JobConfig,
    remote: FakeRemote,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let local = dir.path().join("local");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&local).expect("local root");
        fs::create_dir_all(&dest).expect("destination");

        let job = JobConfig {
            local,
            remote: dest.clone(),
            host: "unused.example.net".to_owned(),
            port: None,
            user: None,
            identity: None,
            state_db: dir.path().join("state.db"),
            exclude: None,
            flatten: None,
            min_free: 0,
            lock_file: None,
            post_sync: None,
        };
        let remote = FakeRemote::new(dest);
        Self {
            _dir: dir,
            job,
            remote,
        }
    }

    fn write_local(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.job.local.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parents");
        }
        fs::write(&path, content).expect("write");
        path
    }

    fn run(&mut self) -> Result<upsync_core::RunSummary, RunError> {
        run_job_with(&mut self.remote, "test", &self.job)
    }
}

#[test]
fn run_mirrors_the_tree_and_settles() {
    let mut fx = Fixture::new();
    fx.write_local("world", b"hello\n");
    fx.write_local("inner/deep", b"data\n");

    let first = fx.run().expect("first run");
    assert!(first.synced_any);
    assert_eq!(fx.remote.read(Path::new("world")).expect("world"), b"hello\n");
    assert_eq!(
        fx.remote.read(Path::new("inner/deep")).expect("deep"),
        b"data\n"
    );

    let second = fx.run().expect("second run");
    assert!(!second.synced_any);
}

#[test]
fn lock_file_is_created_but_never_mirrored() {
    let mut fx = Fixture::new();
    fx.job.lock_file = Some(".upsync.lock".to_owned());
    fx.write_local("world", b"hello\n");

    fx.run().expect("run");
    assert!(fx.job.lock_path().expect("locking enabled").exists());
    assert!(!fx.remote.exists(Path::new(".upsync.lock")));
}

#[test]
fn job_without_a_lock_file_runs_unlocked() {
    let mut fx = Fixture::new();
    fx.write_local("world", b"hello\n");

    assert_eq!(fx.job.lock_path(), None);
    assert!(fx.run().expect("run").synced_any);
    assert!(!fx.job.local.join(".upsync.lock").exists());
}

#[test]
fn contended_lock_aborts_before_any_state_is_touched() {
    let mut fx = Fixture::new();
    fx.job.lock_file = Some(".upsync.lock".to_owned());
    fx.write_local("world", b"hello\n");

    let lock_path = fx.job.lock_path().expect("locking enabled");
    let held = RunLock::acquire(&lock_path).expect("hold lock");
    let err = fx.run().expect_err("contended");
    assert!(matches!(err, RunError::LockHeld { .. }));
    assert!(!fx.job.state_db.exists());
    assert!(!fx.remote.exists(Path::new("world")));
    drop(held);

    assert!(fx.run().expect("after release").synced_any);
}

#[test]
fn post_sync_hook_fires_only_after_a_productive_run() {
    let mut fx = Fixture::new();
    fx.job.post_sync = Some("systemctl restart indexer".to_owned());
    fx.write_local("world", b"hello\n");

    fx.run().expect("productive run");
    assert_eq!(fx.remote.exec_log, ["systemctl restart indexer"]);

    fx.run().expect("idle run");
    assert_eq!(fx.remote.exec_log.len(), 1);
}

#[test]
fn failing_hook_does_not_fail_the_run() {
    let mut fx = Fixture::new();
    fx.job.post_sync = Some("false".to_owned());
    fx.remote.exec_result.success = false;
    fx.remote.exec_result.stderr = "nope".to_owned();
    fx.write_local("world", b"hello\n");

    let summary = fx.run().expect("run succeeds despite hook");
    assert!(summary.synced_any);
}

#[test]
fn per_file_failures_leave_other_files_synchronized() {
    let mut fx = Fixture::new();
    fx.write_local("good", b"fine\n");
    fx.write_local("huge", b"too big for the destination\n");
    // Starve the destination so only the preflight for `huge` fails.
    fx.job.min_free = u64::MAX / 2;
    fx.remote.space_free = u64::MAX / 2 + 10;

    let summary = fx.run().expect("run");
    assert!(summary.synced_any);
    assert!(fx.remote.exists(Path::new("good")));
    assert!(!fx.remote.exists(Path::new("huge")));
}

#[test]
fn excluded_files_are_not_mirrored() {
    let mut fx = Fixture::new();
    fx.job.exclude = Some("*.tmp".to_owned());
    fx.write_local("keep", b"yes\n");
    fx.write_local("scratch.tmp", b"no\n");

    fx.run().expect("run");
    assert!(fx.remote.exists(Path::new("keep")));
    assert!(!fx.remote.exists(Path::new("scratch.tmp")));
}

#[test]
fn flattened_job_lands_everything_at_the_destination_root() {
    let mut fx = Fixture::new();
    fx.job.flatten = Some("$".to_owned());
    fx.write_local("inner/world", b"hello\n");

    fx.run().expect("run");
    assert!(fx.remote.exists(Path::new("inner$world")));
    assert!(!fx.remote.exists(Path::new("inner/world")));
}
