//! One job, one run.

use tracing::{info, warn};

use upsync_engine::SyncEngine;
use upsync_remote::{CommandTransport, Remote, SshEndpoint, SshRemote};
use upsync_tracker::{walk_and_sync, RecordStore, WalkConfig};

use crate::{JobConfig, RunError, RunLock};

/// What a completed run did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunSummary {
    /// Whether at least one file was synchronized this run.
    pub synced_any: bool,
}

/// Runs `job` over a fresh SSH session.
pub fn run_job(name: &str, job: &JobConfig) -> Result<RunSummary, RunError> {
    let endpoint = SshEndpoint {
        host: job.host.clone(),
        port: job.port,
        user: job.user.clone(),
        identity: job.identity.clone(),
    };
    let mut remote = SshRemote::new(CommandTransport::ssh(&endpoint), job.remote.clone());
    run_job_with(&mut remote, name, job)
}

/// Runs `job` over an already-constructed remote session.
///
/// Takes the run lock first when the job configures one: with the lock
/// contended this returns [`RunError::LockHeld`] before touching the record
/// store or the remote. A job without a `lock_file` runs unlocked.
pub fn run_job_with(
    remote: &mut dyn Remote,
    name: &str,
    job: &JobConfig,
) -> Result<RunSummary, RunError> {
    let _lock = match job.lock_path() {
        Some(path) => Some(RunLock::acquire(&path)?),
        None => None,
    };
    info!(
        job = name,
        local = %job.local.display(),
        dest = %job.remote.display(),
        "starting run"
    );

    let mut store = RecordStore::open(&job.state_db).map_err(RunError::Tracker)?;
    let mut engine = SyncEngine::new(job.min_free);
    let walk = WalkConfig {
        root: job.local.clone(),
        exclude: job.exclude.clone(),
        lock_file: job.lock_file.clone(),
        flatten: job.flatten.clone(),
    };

    let synced_any = walk_and_sync(remote, &mut engine, &mut store, &walk)?;
    info!(job = name, synced_any, "run complete");

    if synced_any {
        if let Some(hook) = &job.post_sync {
            run_hook(remote, name, hook);
        }
    }
    Ok(RunSummary { synced_any })
}

/// Fires the post-sync hook. The transfers are already durable, so a hook
/// failure is logged rather than propagated.
fn run_hook(remote: &mut dyn Remote, name: &str, hook: &str) {
    info!(job = name, hook, "running post-sync hook");
    match remote.exec(hook) {
        Ok(output) if output.success => {}
        Ok(output) => {
            warn!(job = name, hook, stderr = %output.stderr, "post-sync hook failed");
        }
        Err(err) => {
            warn!(job = name, hook, error = %err, "post-sync hook failed");
        }
    }
}
