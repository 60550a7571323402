//! TOML job configuration.
//!
//! One file describes any number of jobs, one table per job:
//!
//! ```toml
//! [photos]
//! local = "/home/user/photos"
//! remote = "/srv/backup/photos"
//! host = "nas.example.net"
//! user = "backup"
//! state_db = "/home/user/.photos-sync.db"
//! min_free = 1073741824
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ConfigError;

/// The parsed configuration file: named jobs in name order.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct Config {
    /// Jobs keyed by their table name.
    pub jobs: BTreeMap<String, JobConfig>,
}

impl Config {
    /// Loads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One synchronization job.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Local root to mirror.
    pub local: PathBuf,
    /// Destination base directory; must already exist on the remote.
    pub remote: PathBuf,
    /// Destination host name or address.
    pub host: String,
    /// SSH port, when different from the client default.
    #[serde(default)]
    pub port: Option<u16>,
    /// Remote user name.
    #[serde(default)]
    pub user: Option<String>,
    /// Private key file for the SSH session.
    #[serde(default)]
    pub identity: Option<PathBuf>,
    /// SQLite database recording confirmed transfers.
    pub state_db: PathBuf,
    /// Glob matched against file basenames; matching files are skipped.
    #[serde(default)]
    pub exclude: Option<String>,
    /// Separator that collapses relative paths into flat remote filenames.
    #[serde(default)]
    pub flatten: Option<String>,
    /// Bytes that must remain free on the destination after any transfer.
    #[serde(default)]
    pub min_free: u64,
    /// Run lock file name inside the local root; unset disables run
    /// locking for this job.
    #[serde(default)]
    pub lock_file: Option<String>,
    /// Remote command run once after a run that synchronized anything.
    #[serde(default)]
    pub post_sync: Option<String>,
}

impl JobConfig {
    /// Full path of this job's run lock file, when locking is enabled.
    #[must_use]
    pub fn lock_path(&self) -> Option<PathBuf> {
        self.lock_file.as_deref().map(|name| self.local.join(name))
    }
}
