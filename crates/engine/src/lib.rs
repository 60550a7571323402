#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `upsync-engine` decides, for one local file and one destination path, how
//! to bring the destination up to date: skip it, resume a partial transfer,
//! run a full transfer, or report a conflict. All data lands first in a
//! hidden staging file next to the final name and is committed by a single
//! atomic rename, so partial data never appears under the final name.
//!
//! # Design
//!
//! - [`SyncEngine`] implements the decision procedure behind the
//!   [`FileSyncer`] trait; the tracker depends only on the trait so walks can
//!   be tested with a scripted syncer.
//! - A resumable staging file is verified with a prefix digest: SHA-1 over
//!   the first `D` bytes of the local source must equal the digest of the
//!   `D`-byte staging file before any byte is appended.
//! - Free space is preflighted before every transfer: a full transfer needs
//!   `space_free - size >= min_free`, a resume needs
//!   `space_free + staged - size >= min_free`.
//!
//! # Invariants
//!
//! - The final path is never overwritten: an existing object with mismatched
//!   type, size, or content fails the file, byte-for-byte untouched.
//! - The engine performs no internal retries beyond the single
//!   resume-then-full fallback, and assumes no concurrent writer targets the
//!   same destination path during its own execution.
//! - Failure never leaves partial data under the final name; at worst a
//!   staging file remains for the next run to resume or replace.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use upsync_remote::{HashAlgorithm, Remote, RemoteError};

mod error;

pub use error::SyncError;

/// Transfer chunk size for prefix hashing and append streaming.
const CHUNK_SIZE: usize = 32 * 1024;

/// Suffix of the hidden staging name used during every transfer.
pub const STAGING_SUFFIX: &str = ".synctmp";

/// Hidden staging name for a remote filename.
///
/// ```
/// assert_eq!(upsync_engine::staging_name("world"), ".world.synctmp");
/// ```
#[must_use]
pub fn staging_name(filename: &str) -> String {
    format!(".{filename}{STAGING_SUFFIX}")
}

/// One candidate file, as produced by the tracker's walk.
///
/// Ephemeral: built once per walk per candidate, consumed by the engine,
/// never persisted.
#[derive(Clone, Debug)]
pub struct TransferTask {
    /// Absolute path of the local source file.
    pub local_path: PathBuf,
    /// Size of the local file when it was scanned.
    pub size: u64,
    /// Destination directory, relative to the remote base.
    pub remote_dir: PathBuf,
    /// Destination filename within `remote_dir`.
    pub remote_filename: String,
}

impl TransferTask {
    /// Final destination path for this task.
    #[must_use]
    pub fn final_path(&self) -> PathBuf {
        self.remote_dir.join(&self.remote_filename)
    }

    /// Hidden staging path for this task.
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.remote_dir.join(staging_name(&self.remote_filename))
    }
}

/// Successful result of a file-sync attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncOutcome {
    /// Bytes were moved; the final path now matches the local source.
    Transferred(u64),
    /// The destination already matched; zero bytes were moved.
    AlreadySynced,
}

/// Synchronizes one file to the destination.
///
/// The tracker drives this trait rather than [`SyncEngine`] directly so that
/// walk behavior can be tested against a scripted implementation.
pub trait FileSyncer {
    /// Brings `task`'s destination up to date with its local source.
    fn sync_file(
        &mut self,
        remote: &mut dyn Remote,
        task: &TransferTask,
    ) -> Result<SyncOutcome, SyncError>;
}

/// The production file synchronizer.
#[derive(Clone, Copy, Debug)]
pub struct SyncEngine {
    min_free: u64,
}

impl SyncEngine {
    /// Creates an engine that keeps at least `min_free` bytes available on
    /// the destination after every transfer.
    #[must_use]
    pub fn new(min_free: u64) -> Self {
        Self { min_free }
    }
}

impl FileSyncer for SyncEngine {
    fn sync_file(
        &mut self,
        remote: &mut dyn Remote,
        task: &TransferTask,
    ) -> Result<SyncOutcome, SyncError> {
        let final_path = task.final_path();
        let staging_path = task.staging_path();
        info!(
            local = %task.local_path.display(),
            dest = %final_path.display(),
            size = task.size,
            "synchronizing file"
        );

        ensure_remote_dir(remote, &task.remote_dir)?;

        if let Some(existing) = remote.stat(&final_path)? {
            return check_existing_final(remote, task, &final_path, existing);
        }

        if let Some(staged) = remote.stat(&staging_path)? {
            if staged.is_regular_file() {
                match resume(remote, task, &staging_path, staged.size, self.min_free) {
                    Ok(appended) => {
                        remote.rename(&staging_path, &final_path)?;
                        info!(dest = %final_path.display(), appended, "resume committed");
                        return Ok(SyncOutcome::Transferred(appended));
                    }
                    Err(err) if err.resume_falls_back() => {
                        warn!(
                            staging = %staging_path.display(),
                            error = %err,
                            "resume failed, falling back to full transfer"
                        );
                    }
                    Err(err) => return Err(err),
                }
            } else {
                return Err(SyncError::DestinationConflict {
                    path: staging_path,
                    detail: "staging path exists but is not a regular file".to_owned(),
                });
            }
        }

        let written = full_transfer(remote, task, &staging_path, self.min_free)?;
        remote.rename(&staging_path, &final_path)?;
        info!(dest = %final_path.display(), bytes = written, "full transfer committed");
        Ok(SyncOutcome::Transferred(written))
    }
}

/// Confirms every level of `dir` exists on the destination, creating missing
/// levels parent-first.
///
/// The base case is the session base directory itself: if it is absent the
/// whole attempt fails, nothing is created. A segment that exists as a
/// non-directory fails without further side effects.
fn ensure_remote_dir(remote: &mut dyn Remote, dir: &Path) -> Result<(), SyncError> {
    match remote.stat(Path::new(""))? {
        Some(state) if state.is_directory() => {}
        Some(_) => {
            return Err(SyncError::DirectoryCreation {
                path: PathBuf::new(),
                detail: "remote base exists but is not a directory".to_owned(),
            });
        }
        None => {
            return Err(SyncError::DirectoryCreation {
                path: PathBuf::new(),
                detail: "remote base directory does not exist".to_owned(),
            });
        }
    }

    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        match remote.stat(&current)? {
            Some(state) if state.is_directory() => {}
            Some(_) => {
                return Err(SyncError::DirectoryCreation {
                    path: current,
                    detail: "path segment exists but is not a directory".to_owned(),
                });
            }
            None => {
                info!(dir = %current.display(), "creating remote directory");
                remote.mkdir(&current).map_err(|err| SyncError::DirectoryCreation {
                    path: current.clone(),
                    detail: err.to_string(),
                })?;
            }
        }
    }
    Ok(())
}

/// Decides what an existing object at the final path means for this task.
fn check_existing_final(
    remote: &mut dyn Remote,
    task: &TransferTask,
    final_path: &Path,
    existing: upsync_remote::RemoteFileState,
) -> Result<SyncOutcome, SyncError> {
    if !existing.is_regular_file() {
        return Err(SyncError::DestinationConflict {
            path: final_path.to_path_buf(),
            detail: "existing object is not a regular file".to_owned(),
        });
    }
    if existing.size != task.size {
        return Err(SyncError::DestinationConflict {
            path: final_path.to_path_buf(),
            detail: format!(
                "existing file has {} bytes, local source has {}",
                existing.size, task.size
            ),
        });
    }

    let local_digest = local_prefix_digest(&task.local_path, task.size)?;
    let remote_digest = remote.content_hash(final_path, HashAlgorithm::Sha1, None)?;
    if local_digest == remote_digest {
        debug!(dest = %final_path.display(), "destination already up to date");
        return Ok(SyncOutcome::AlreadySynced);
    }
    Err(SyncError::DestinationConflict {
        path: final_path.to_path_buf(),
        detail: "same size but divergent content".to_owned(),
    })
}

/// Streams the whole local file to the staging path after a space preflight.
fn full_transfer(
    remote: &mut dyn Remote,
    task: &TransferTask,
    staging_path: &Path,
    min_free: u64,
) -> Result<u64, SyncError> {
    let free = remote.space_free(&task.remote_dir)?;
    let needed = task.size.saturating_add(min_free);
    if free < needed {
        return Err(SyncError::SpacePreflight {
            path: task.remote_dir.clone(),
            free,
            needed,
        });
    }
    debug!(
        staging = %staging_path.display(),
        free,
        size = task.size,
        "starting full transfer"
    );

    let mut src = File::open(&task.local_path).map_err(|source| SyncError::Local {
        path: task.local_path.clone(),
        source,
    })?;
    let written = remote
        .put_full(&mut src, staging_path, task.size)
        .map_err(|err| match err {
            RemoteError::ShortWrite {
                path,
                expected,
                written,
            } => SyncError::TransferIncomplete {
                path,
                expected,
                actual: written,
            },
            other => SyncError::Transport(other),
        })?;
    Ok(written)
}

/// Appends the missing suffix of the local file onto a verified staging
/// prefix.
fn resume(
    remote: &mut dyn Remote,
    task: &TransferTask,
    staging_path: &Path,
    staged: u64,
    min_free: u64,
) -> Result<u64, SyncError> {
    info!(
        staging = %staging_path.display(),
        staged,
        size = task.size,
        "attempting to resume partial transfer"
    );
    if staged > task.size {
        return Err(SyncError::StagingOversized {
            path: staging_path.to_path_buf(),
            staged,
            size: task.size,
        });
    }

    let mut src = File::open(&task.local_path).map_err(|source| SyncError::Local {
        path: task.local_path.clone(),
        source,
    })?;
    let local_digest = prefix_digest_from(&mut src, &task.local_path, staged)?;
    let remote_digest = remote.content_hash(staging_path, HashAlgorithm::Sha1, Some(staged))?;
    if local_digest != remote_digest {
        return Err(SyncError::PrefixMismatch {
            path: staging_path.to_path_buf(),
            prefix_len: staged,
        });
    }
    debug!(staging = %staging_path.display(), "staging prefix verified");

    // The staged bytes are reclaimed by the transfer, so they count as free.
    let free = remote.space_free(&task.remote_dir)?;
    let needed = task.size.saturating_add(min_free);
    if free.saturating_add(staged) < needed {
        return Err(SyncError::SpacePreflight {
            path: task.remote_dir.clone(),
            free: free.saturating_add(staged),
            needed,
        });
    }

    let mut appended: u64 = 0;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut dst = remote.open_append(staging_path)?;
    loop {
        let n = src.read(&mut buf).map_err(|source| SyncError::Local {
            path: task.local_path.clone(),
            source,
        })?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])
            .map_err(|err| SyncError::Transport(RemoteError::Io(err)))?;
        appended += n as u64;
    }
    dst.finish()?;

    let after = remote.stat(staging_path)?;
    let actual = after.map_or(0, |state| state.size);
    if actual != task.size {
        return Err(SyncError::TransferIncomplete {
            path: staging_path.to_path_buf(),
            expected: task.size,
            actual,
        });
    }
    info!(staging = %staging_path.display(), appended, "append complete");
    Ok(appended)
}

/// SHA-1 over the first `limit` bytes of the local file at `path`.
fn local_prefix_digest(path: &Path, limit: u64) -> Result<String, SyncError> {
    let mut file = File::open(path).map_err(|source| SyncError::Local {
        path: path.to_path_buf(),
        source,
    })?;
    prefix_digest_from(&mut file, path, limit)
}

/// SHA-1 over the next `limit` bytes of `reader`, leaving the reader
/// positioned just past them.
fn prefix_digest_from(
    reader: &mut File,
    path: &Path,
    limit: u64,
) -> Result<String, SyncError> {
    let mut hasher = Sha1::new();
    let mut remaining = limit;
    let mut buf = [0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = usize::try_from(remaining.min(CHUNK_SIZE as u64)).unwrap_or(CHUNK_SIZE);
        let n = reader.read(&mut buf[..want]).map_err(|source| SyncError::Local {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            return Err(SyncError::LocalReadShort {
                path: path.to_path_buf(),
                expected: limit,
                read: limit - remaining,
            });
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hex_digest(&hasher.finalize()))
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
