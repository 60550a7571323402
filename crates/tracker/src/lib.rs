#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `upsync-tracker` walks the local tree, decides which files need to be
//! synchronized, drives the engine for each candidate, and records confirmed
//! transfers in a durable SQLite store.
//!
//! # Design
//!
//! - Change detection is deliberately cheap: a file is a candidate exactly
//!   when its current size differs from the recorded size of its last
//!   confirmed transfer. Content changes that preserve byte count are not
//!   detected; that is a documented tradeoff, not a bug.
//! - One file's failure never aborts the walk. The record is only updated on
//!   confirmed success, so a failed file is retried verbatim on the next run.
//! - The traversal is an explicit stack over `read_dir`, enumerating regular
//!   files in no guaranteed order. Unreadable directories are logged and
//!   skipped.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use tracing::{debug, error, info, warn};

use upsync_engine::{FileSyncer, TransferTask};
use upsync_remote::Remote;

mod error;
mod store;

pub use error::TrackerError;
pub use store::RecordStore;

/// Walk-level inputs, read-only for the duration of one run.
#[derive(Clone, Debug)]
pub struct WalkConfig {
    /// Local root being mirrored.
    pub root: PathBuf,
    /// Glob matched against file basenames; matching files are skipped.
    pub exclude: Option<String>,
    /// Name of the run lock file, skipped when it sits directly at the root.
    pub lock_file: Option<String>,
    /// When set, the relative path is collapsed into a single remote
    /// filename at the remote root, joining segments with this separator.
    pub flatten: Option<String>,
}

/// Walks the local tree and synchronizes every stale file.
///
/// Returns `Ok(true)` when at least one file was synchronized (including
/// files the engine confirmed as already matching the destination).
pub fn walk_and_sync(
    remote: &mut dyn Remote,
    syncer: &mut dyn FileSyncer,
    store: &mut RecordStore,
    config: &WalkConfig,
) -> Result<bool, TrackerError> {
    let exclude = compile_exclude(config.exclude.as_deref())?;
    let mut synced_any = false;
    let mut pending = vec![config.root.clone()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                debug!(path = %path.display(), "skipping non-regular file");
                continue;
            }
            let Some(name) = path.file_name().and_then(OsStr::to_str) else {
                warn!(path = %path.display(), "skipping file with non-UTF-8 name");
                continue;
            };
            if let Some(matcher) = &exclude {
                if matcher.is_match(name) {
                    info!(path = %path.display(), "skipping excluded file");
                    continue;
                }
            }
            if dir == config.root && config.lock_file.as_deref() == Some(name) {
                info!(path = %path.display(), "skipping run lock file");
                continue;
            }
            if maybe_sync(remote, syncer, store, config, &path)? {
                synced_any = true;
            }
        }
    }
    Ok(synced_any)
}

fn compile_exclude(pattern: Option<&str>) -> Result<Option<GlobMatcher>, TrackerError> {
    match pattern {
        Some(pattern) if !pattern.is_empty() => {
            Ok(Some(Glob::new(pattern)?.compile_matcher()))
        }
        _ => Ok(None),
    }
}

/// Syncs one file if its size differs from the recorded size.
///
/// Returns whether the file was (re)confirmed as synchronized. Engine
/// failures are logged and absorbed so the walk continues.
fn maybe_sync(
    remote: &mut dyn Remote,
    syncer: &mut dyn FileSyncer,
    store: &mut RecordStore,
    config: &WalkConfig,
    path: &Path,
) -> Result<bool, TrackerError> {
    let Ok(rel) = path.strip_prefix(&config.root) else {
        warn!(path = %path.display(), "walked outside the configured root");
        return Ok(false);
    };
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            // The file may have vanished between enumeration and here.
            warn!(path = %path.display(), error = %err, "skipping unreadable file");
            return Ok(false);
        }
    };

    let key = record_key(rel);
    let recorded = store.recorded_size(&key)?;
    debug!(pathname = key, size, ?recorded, "checking file");
    if recorded == Some(size) {
        return Ok(false);
    }

    let (remote_dir, remote_filename) = remote_target(rel, config.flatten.as_deref());
    let task = TransferTask {
        local_path: path.to_path_buf(),
        size,
        remote_dir,
        remote_filename,
    };
    match syncer.sync_file(remote, &task) {
        Ok(outcome) => {
            info!(pathname = key, size, ?outcome, "synchronization complete");
            store.record(&key, size)?;
            Ok(true)
        }
        Err(err) => {
            error!(pathname = key, error = %err, "synchronization failed");
            Ok(false)
        }
    }
}

/// Record-store key for a relative path: segments joined with `/` on every
/// platform, independent of any flatten transform.
fn record_key(rel: &Path) -> String {
    rel.iter()
        .map(|segment| segment.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Remote-facing destination for a relative path.
///
/// Without flattening the file keeps its relative directory; with a flatten
/// separator the whole relative path becomes one filename at the remote
/// root.
fn remote_target(rel: &Path, flatten: Option<&str>) -> (PathBuf, String) {
    match flatten {
        Some(sep) => {
            let name = rel
                .iter()
                .map(|segment| segment.to_string_lossy())
                .collect::<Vec<_>>()
                .join(sep);
            (PathBuf::new(), name)
        }
        None => {
            let name = rel
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = rel.parent().map(Path::to_path_buf).unwrap_or_default();
            (dir, name)
        }
    }
}
