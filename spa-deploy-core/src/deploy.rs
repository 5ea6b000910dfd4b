//! High-level pipeline: scan → list → plan → inject → execute → invalidate.
//!
//! [`prepare_deploy`] does all the read-only work and returns a [`DeployPlan`] the caller
//! can print and confirm. [`apply_deploy`] then mutates the bucket and the CDN.
//!
//! # Responsibilities
//! - Fail fast on configuration, scan and listing errors, before anything is written
//! - Keep the plan in memory only; re-running recomputes it against the current bucket
//!
//! # Error Handling
//! Every stage error is wrapped in [`DeployError`]. Injection misses are warnings and do
//! not fail the run.

use futures::TryStreamExt;
use tracing::{info, warn};

use crate::config::DeployConfig;
use crate::contract::{CdnInvalidator, ObjectStore};
use crate::error::DeployError;
use crate::execute::{execute_plan, ExecutionReport};
use crate::glob::GlobList;
use crate::inject::{inject_env, InjectReport};
use crate::invalidate::{execute_invalidations, plan_invalidations, InvalidationReceipt};
use crate::plan::{build_plan, SyncPlan};
use crate::remote::{list_remote, RemoteFile};
use crate::scan::{LocalFile, LocalScan};

/// A fully computed deploy, ready to print and apply.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub plan: SyncPlan,
    /// CDN paths to purge after the upload.
    pub invalidations: Vec<String>,
    pub inject: InjectReport,
}

impl DeployPlan {
    pub fn has_changes(&self) -> bool {
        self.plan.has_changes()
    }
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub execution: ExecutionReport,
    pub invalidations: Vec<InvalidationReceipt>,
}

/// Build the sync plan for `config` against the current bucket contents.
pub async fn prepare_deploy<S>(config: &DeployConfig, store: &S) -> Result<DeployPlan, DeployError>
where
    S: ObjectStore + ?Sized,
{
    config.validate()?;
    let plan_options = config.plan_options()?;
    let index_glob = GlobList::new(&config.index_glob)?;

    info!(path = %config.build_path.display(), "[DEPLOY] Scanning local files");
    let local: Vec<LocalFile> =
        LocalScan::new(&config.scan_options())?.collect::<Result<_, _>>()?;
    info!(files = local.len(), "[DEPLOY] Local scan complete");

    let target = config.target();
    info!(bucket = %target.bucket, prefix = ?target.prefix, "[DEPLOY] Listing remote files");
    let remote: Vec<RemoteFile> = list_remote(store, &target.bucket, target.prefix.as_deref())
        .try_collect()
        .await?;
    info!(objects = remote.len(), "[DEPLOY] Remote listing complete");

    let mut plan = build_plan(local, remote, &target, &plan_options);

    let inject = inject_env(&mut plan, &index_glob, &config.globals, config.force)?;
    if !inject.skipped.is_empty() {
        warn!(skipped = ?inject.skipped, "[DEPLOY] Some index files were not injected");
    }
    plan.sort();

    let invalidations = plan_invalidations(&plan, &config.invalidate_paths);
    Ok(DeployPlan {
        plan,
        invalidations,
        inject,
    })
}

/// Apply a prepared plan, then invalidate the CDN if there is anything to purge.
pub async fn apply_deploy<S, C>(
    deploy: &DeployPlan,
    config: &DeployConfig,
    store: &S,
    cdn: &C,
) -> Result<DeployReport, DeployError>
where
    S: ObjectStore + ?Sized,
    C: CdnInvalidator + ?Sized,
{
    let execution = execute_plan(&deploy.plan, store, config.concurrency).await?;

    let invalidations = if deploy.invalidations.is_empty() {
        Vec::new()
    } else {
        execute_invalidations(cdn, &deploy.invalidations, &config.distribution_ids).await?
    };

    info!(
        uploaded = execution.uploaded,
        deleted = execution.deleted,
        invalidations = invalidations.len(),
        "[DEPLOY] Done"
    );
    Ok(DeployReport {
        execution,
        invalidations,
    })
}
