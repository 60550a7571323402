#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `upsync-remote` defines the remote file-operation interface consumed by the
//! synchronization engine, together with the production adapter that drives a
//! spawned OpenSSH client. The [`Remote`] trait captures exactly the
//! operations a one-way mirror needs against its destination: metadata
//! queries, single-level directory creation, whole-file and append-mode
//! writes, atomic rename, free-space queries, content digests, and command
//! execution for the post-sync hook.
//!
//! # Design
//!
//! - [`Remote`] is an object-safe trait so the engine, tracker, and run
//!   coordinator can be exercised against a fake implementation in tests
//!   without any substitution tricks at runtime.
//! - [`SshRemote`] implements the trait by running POSIX commands on the far
//!   side of an SSH session (`stat`, `mkdir`, `cat`, `mv`, `df`, `sha1sum`).
//!   Every call is a blocking round-trip; the crate owns no concurrency.
//! - All paths handed to a [`Remote`] are interpreted relative to the session
//!   base directory fixed at construction time. The empty path names the base
//!   itself.
//!
//! # Errors
//!
//! Operations report [`RemoteError`]. Transport-level failures (the SSH
//! process could not be spawned, a pipe broke) and remote command failures
//! are both ordinary errors; callers decide whether they abort a single file
//! or a whole run.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

mod error;
mod ssh;

pub use error::RemoteError;
pub use ssh::{CommandTransport, SshEndpoint, SshRemote};

/// Classification of a remote filesystem object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything else (symlink, device, socket, ...).
    Other,
}

/// Metadata for one remote path, queried fresh on every call and never
/// cached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemoteFileState {
    /// What kind of object sits at the path.
    pub kind: FileKind,
    /// Size in bytes as reported by the destination.
    pub size: u64,
}

impl RemoteFileState {
    /// Returns `true` when the object is a regular file.
    #[must_use]
    pub fn is_regular_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Returns `true` when the object is a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Digest algorithms understood by [`Remote::content_hash`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HashAlgorithm {
    /// SHA-1, the digest the sync engine compares prefixes with.
    Sha1,
}

impl HashAlgorithm {
    /// Name of the coreutils digest command for this algorithm.
    #[must_use]
    pub fn command(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1sum",
        }
    }

    /// Length of the hex digest this algorithm produces.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => f.write_str("sha1"),
        }
    }
}

/// Captured output of a remote command run through [`Remote::exec`].
#[derive(Clone, Debug, Default)]
pub struct ExecOutput {
    /// Standard output, decoded lossily.
    pub stdout: String,
    /// Standard error, decoded lossily.
    pub stderr: String,
    /// Whether the command reported a zero exit status.
    pub success: bool,
}

/// Write handle returned by [`Remote::open_append`].
///
/// The handle is positioned at the current end of the remote file. Callers
/// must invoke [`finish`](RemoteWriter::finish) to flush the stream and learn
/// whether the remote side accepted every byte; dropping the handle without
/// finishing abandons the transfer.
pub trait RemoteWriter: Write {
    /// Flushes buffered data, closes the stream, and waits for the remote
    /// side to confirm completion.
    fn finish(self: Box<Self>) -> Result<(), RemoteError>;
}

/// Abstract remote file-operations session.
///
/// All paths are relative to the session base directory; the empty path
/// refers to the base itself. Every method is a blocking round-trip against
/// the destination.
pub trait Remote {
    /// Queries metadata for `path`, returning `Ok(None)` when nothing exists
    /// there.
    fn stat(&mut self, path: &Path) -> Result<Option<RemoteFileState>, RemoteError>;

    /// Creates exactly one directory level; fails if the parent is missing.
    fn mkdir(&mut self, path: &Path) -> Result<(), RemoteError>;

    /// Opens `path` for appending, positioned at the current end of file.
    fn open_append<'a>(&'a mut self, path: &Path)
    -> Result<Box<dyn RemoteWriter + 'a>, RemoteError>;

    /// Streams all of `src` to `path`, replacing any existing content.
    ///
    /// Returns the number of bytes written, which equals `expected_size` on
    /// success; a short or over-long write yields [`RemoteError::ShortWrite`]
    /// with the partial content left in place at the destination.
    fn put_full(
        &mut self,
        src: &mut dyn Read,
        path: &Path,
        expected_size: u64,
    ) -> Result<u64, RemoteError>;

    /// Atomically moves `from` to `to` on the destination filesystem.
    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), RemoteError>;

    /// Bytes available on the filesystem containing `path`.
    fn space_free(&mut self, path: &Path) -> Result<u64, RemoteError>;

    /// Lowercase hex digest of the content at `path`, optionally limited to
    /// its first `byte_limit` bytes.
    fn content_hash(
        &mut self,
        path: &Path,
        algo: HashAlgorithm,
        byte_limit: Option<u64>,
    ) -> Result<String, RemoteError>;

    /// Runs an arbitrary command on the destination host, capturing its
    /// output. Used only for the post-sync hook.
    fn exec(&mut self, command: &str) -> Result<ExecOutput, RemoteError>;
}
