//! Run-fatal tracker failures.
//!
//! Per-file sync failures are not errors at this level; the walk logs them
//! and keeps going. What does surface here poisons the whole run: a broken
//! exclusion pattern or a record store that cannot be read or written.

use thiserror::Error;

/// Failure that aborts the walk.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The configured exclusion glob does not compile.
    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// The sync record store failed.
    #[error("sync record store failure: {0}")]
    Store(#[from] rusqlite::Error),
}
