//! Coordinator-level failures.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use upsync_tracker::TrackerError;

/// Failure to load the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Io {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The file is not valid job configuration.
    #[error("cannot parse configuration {path}: {source}")]
    Parse {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying TOML failure.
        source: toml::de::Error,
    },
}

/// Failure that aborts one job's run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Another run holds the job's lock; nothing was done.
    #[error("another run holds the lock {path}")]
    LockHeld {
        /// Lock file path.
        path: PathBuf,
    },

    /// The lock file could not be created or locked.
    #[error("cannot acquire lock {path}: {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The walk or its record store failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}
