//! Error type shared by every remote operation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single remote operation.
///
/// Each variant corresponds to a distinct failure surface: the transport
/// process itself, the remote command it ran, the output that command
/// produced, or a size check on written data. Callers treat all of them as
/// ordinary, reportable outcomes.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The transport command (typically `ssh`) could not be spawned.
    #[error("failed to launch transport command: {0}")]
    Spawn(#[source] io::Error),

    /// I/O against the transport's pipes failed mid-operation.
    #[error("transport i/o failure: {0}")]
    Io(#[from] io::Error),

    /// The remote command exited unsuccessfully.
    #[error("remote command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command that was executed on the destination.
        command: String,
        /// Human-readable exit status.
        status: String,
        /// Trimmed standard error captured from the command.
        stderr: String,
    },

    /// The remote command succeeded but produced output this crate could not
    /// interpret.
    #[error("could not parse output of remote command `{command}`: {output:?}")]
    Parse {
        /// The command whose output was malformed.
        command: String,
        /// The offending output, truncated for diagnostics.
        output: String,
    },

    /// A write completed but the destination holds a different number of
    /// bytes than expected.
    #[error("short write to '{}': expected {expected} bytes, wrote {written}", path.display())]
    ShortWrite {
        /// Destination path of the incomplete write.
        path: PathBuf,
        /// Bytes the caller intended to write.
        expected: u64,
        /// Bytes the destination actually holds.
        written: u64,
    },
}
