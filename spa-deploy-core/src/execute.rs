//! Applying a sync plan to the object store.
//!
//! Items are applied in plan order. Consecutive items sharing an action and cache policy
//! form a tier; tiers run one after another, so uncached index pages are only written once
//! every cached asset before them is in place. Inside a tier up to `concurrency`
//! operations are in flight. Keys are independent, so the final bucket state equals a
//! fully sequential run.
//!
//! Plan keys are relative to the plan prefix; every request goes to
//! [`SyncPlan::object_key`].

use futures::stream::{self, TryStreamExt};
use tracing::{debug, info};

use crate::contract::{DeleteObjectRequest, ObjectStore, PutObjectRequest};
use crate::error::ExecuteError;
use crate::plan::{PlanItem, SyncAction, SyncPlan};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub uploaded: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Apply every Create/Update/Delete in `plan`. The first failure aborts the run; already
/// applied items stay applied.
pub async fn execute_plan<S>(
    plan: &SyncPlan,
    store: &S,
    concurrency: usize,
) -> Result<ExecutionReport, ExecuteError>
where
    S: ObjectStore + ?Sized,
{
    let concurrency = concurrency.max(1);
    info!(
        bucket = %plan.bucket,
        items = plan.items.len(),
        concurrency,
        "Executing sync plan"
    );

    for tier in plan
        .items
        .chunk_by(|a, b| a.action == b.action && a.cache == b.cache)
    {
        if !tier[0].action.is_mutating() {
            continue;
        }
        debug!(
            action = %tier[0].action,
            cache = tier[0].cache,
            items = tier.len(),
            "Applying tier"
        );
        stream::iter(tier.iter().map(Ok::<_, ExecuteError>))
            .try_for_each_concurrent(concurrency, |item| apply_item(plan, store, item))
            .await?;
    }

    let mut report = ExecutionReport::default();
    for item in &plan.items {
        match item.action {
            SyncAction::Create | SyncAction::Update => report.uploaded += 1,
            SyncAction::Delete => report.deleted += 1,
            _ => report.skipped += 1,
        }
    }
    info!(
        uploaded = report.uploaded,
        deleted = report.deleted,
        "Sync plan applied"
    );
    Ok(report)
}

async fn apply_item<S>(plan: &SyncPlan, store: &S, item: &PlanItem) -> Result<(), ExecuteError>
where
    S: ObjectStore + ?Sized,
{
    let key = plan.object_key(&item.key);
    match item.action {
        SyncAction::Create | SyncAction::Update => {
            info!(key = %key, "Uploading");
            let body = upload_body(item).await?;
            store
                .put_object(PutObjectRequest {
                    bucket: plan.bucket.clone(),
                    key: key.clone(),
                    body,
                    cache_control: item.cache_control.clone(),
                    content_type: item.content_type.clone(),
                    content_disposition: item.content_disposition.clone(),
                    acl: item.acl.clone(),
                })
                .await
                .map_err(|source| ExecuteError::Upload { key, source })
        }
        SyncAction::Delete => {
            info!(key = %key, "Deleting");
            store
                .delete_object(DeleteObjectRequest {
                    bucket: plan.bucket.clone(),
                    key: key.clone(),
                })
                .await
                .map_err(|source| ExecuteError::Delete { key, source })
        }
        SyncAction::Unknown | SyncAction::Ignore | SyncAction::Unchanged => Ok(()),
    }
}

async fn upload_body(item: &PlanItem) -> Result<Vec<u8>, ExecuteError> {
    if let Some(data) = &item.data {
        return Ok(data.clone());
    }
    let local = item
        .local
        .as_ref()
        .ok_or_else(|| ExecuteError::MissingLocalFile(item.key.clone()))?;
    tokio::fs::read(&local.path)
        .await
        .map_err(|source| ExecuteError::Read {
            path: local.path.clone(),
            source,
        })
}
