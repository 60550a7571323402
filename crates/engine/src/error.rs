//! Failure taxonomy for one file-sync attempt.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use upsync_remote::RemoteError;

/// Why one file could not be synchronized.
///
/// Every variant is an ordinary, reportable outcome: the tracker logs it and
/// moves on to the next file, and because the record store is only updated on
/// success the same file is retried verbatim on the next run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The final path holds an object this tool refuses to overwrite:
    /// wrong type, wrong size, or byte-identical size with divergent content.
    #[error("refusing to overwrite '{}': {detail}", path.display())]
    DestinationConflict {
        /// The conflicting remote path.
        path: PathBuf,
        /// What about the existing object blocked the transfer.
        detail: String,
    },

    /// A required remote directory level is missing and could not be
    /// created, or a path segment exists as a non-directory.
    #[error("cannot provide remote directory '{}': {detail}", path.display())]
    DirectoryCreation {
        /// The directory level that failed.
        path: PathBuf,
        /// Why it failed.
        detail: String,
    },

    /// Predicted free space after the transfer would fall below the
    /// configured minimum. Checked before any bytes move.
    #[error(
        "not enough space under '{}': {free} bytes free, transfer needs {needed} kept clear",
        path.display()
    )]
    SpacePreflight {
        /// Remote directory whose filesystem was queried.
        path: PathBuf,
        /// Bytes currently available (plus any reclaimable staging bytes).
        free: u64,
        /// Bytes that must remain available for the transfer to proceed.
        needed: u64,
    },

    /// The destination reports a different size than expected after a full
    /// or resumed transfer. The staging file is left in place.
    #[error(
        "incomplete transfer to '{}': expected {expected} bytes, destination has {actual}",
        path.display()
    )]
    TransferIncomplete {
        /// Staging path holding the partial data.
        path: PathBuf,
        /// Size the destination should have reached.
        expected: u64,
        /// Size the destination actually reports.
        actual: u64,
    },

    /// The staging file is not a byte-for-byte prefix of the local source.
    #[error(
        "first {prefix_len} bytes of '{}' do not match the local source",
        path.display()
    )]
    PrefixMismatch {
        /// The staging path whose prefix diverged.
        path: PathBuf,
        /// Length of the compared prefix.
        prefix_len: u64,
    },

    /// The staging file is larger than the local source, so it cannot be a
    /// valid prefix.
    #[error(
        "staging file '{}' has {staged} bytes but the local source only {size}",
        path.display()
    )]
    StagingOversized {
        /// The oversized staging path.
        path: PathBuf,
        /// Bytes currently staged.
        staged: u64,
        /// Size of the local source.
        size: u64,
    },

    /// The local file produced fewer bytes than the staging prefix requires;
    /// the source was likely truncated after it was scanned.
    #[error(
        "local file '{}' yielded {read} of {expected} required bytes",
        path.display()
    )]
    LocalReadShort {
        /// The local file that came up short.
        path: PathBuf,
        /// Bytes that were required.
        expected: u64,
        /// Bytes actually read.
        read: u64,
    },

    /// Reading the local source failed.
    #[error("local i/o error on '{}': {source}", path.display())]
    Local {
        /// The local file involved.
        path: PathBuf,
        /// The underlying I/O failure.
        source: io::Error,
    },

    /// A remote operation failed for transport reasons.
    #[error(transparent)]
    Transport(#[from] RemoteError),
}

impl SyncError {
    /// Whether a failed resume attempt may fall through to a full transfer.
    ///
    /// A full transfer rewrites the staging file from scratch, so a diverged
    /// or oversized staging prefix and transport hiccups during the resume
    /// are all safe to retry that way. A short local read means the source
    /// itself is suspect, a failed space preflight would only get worse, and
    /// a post-append size mismatch points at a concurrent writer; those fail
    /// the file outright.
    pub(crate) fn resume_falls_back(&self) -> bool {
        matches!(
            self,
            Self::PrefixMismatch { .. } | Self::StagingOversized { .. } | Self::Transport(_)
        )
    }
}
