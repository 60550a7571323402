#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `upsync-core` ties the workspace together: it loads job configuration,
//! takes the per-job run lock, opens the record store, and drives one
//! tracker walk per job over an SSH session. It is the only crate the
//! binary needs to depend on.
//!
//! # Design
//!
//! - One job is one independent unit: its own local root, destination,
//!   record store, and lock file. Jobs never share state and run strictly
//!   one after another.
//! - The run lock, when a job configures one, is an advisory exclusive lock
//!   on a file inside the local root. A second invocation that finds the
//!   lock held reports the contention and touches nothing else, so
//!   overlapping cron schedules degrade to skipped runs rather than
//!   interleaved transfers. A job without a `lock_file` runs unlocked.
//! - The post-sync hook fires at most once per run, only after at least one
//!   file was confirmed synchronized. A failing hook is logged but does not
//!   fail the run; the transfers it follows are already durable.

mod config;
mod error;
mod lock;
mod run;

pub use config::{Config, JobConfig};
pub use error::{ConfigError, RunError};
pub use lock::RunLock;
pub use run::{run_job, run_job_with, RunSummary};
