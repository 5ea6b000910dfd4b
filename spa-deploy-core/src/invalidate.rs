//! CDN invalidation: which paths to purge and submitting them per distribution.

use chrono::{SecondsFormat, Utc};
use tracing::{error, info, warn};

use crate::contract::{CdnInvalidator, InvalidationRequest};
use crate::error::{DistributionFailure, InvalidationError};
use crate::plan::SyncPlan;

/// Path used when a standalone invalidation has nothing more specific to purge.
pub const INVALIDATE_EVERYTHING: &str = "/*";

/// `/<prefix><key>` for every item flagged for invalidation, followed by `extra_paths`.
pub fn plan_invalidations(plan: &SyncPlan, extra_paths: &[String]) -> Vec<String> {
    plan.items
        .iter()
        .filter(|item| item.invalidate)
        .map(|item| format!("/{}", plan.object_key(&item.key)))
        .chain(extra_paths.iter().cloned())
        .collect()
}

/// Paths for a standalone invalidation run: the configured ones, or everything.
pub fn standalone_paths(configured: &[String]) -> Vec<String> {
    if configured.is_empty() {
        info!("No invalidation paths set, invalidating everything");
        vec![INVALIDATE_EVERYTHING.to_string()]
    } else {
        configured.to_vec()
    }
}

/// Caller reference for an invalidation batch, unique down to the millisecond.
pub fn caller_reference() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A submitted invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReceipt {
    pub distribution_id: String,
    pub invalidation_id: Option<String>,
}

/// Submit `paths` to every distribution in turn. A failing distribution does not stop the
/// remaining ones; all failures are returned together.
pub async fn execute_invalidations<C>(
    cdn: &C,
    paths: &[String],
    distribution_ids: &[String],
) -> Result<Vec<InvalidationReceipt>, InvalidationError>
where
    C: CdnInvalidator + ?Sized,
{
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    if distribution_ids.is_empty() {
        warn!("No CloudFront distribution set, will not invalidate cache");
        return Ok(Vec::new());
    }

    let mut receipts = Vec::new();
    let mut failures = Vec::new();
    for distribution_id in distribution_ids {
        info!(distribution_id = %distribution_id, paths = paths.len(), "Invalidating");
        let request = InvalidationRequest {
            distribution_id: distribution_id.clone(),
            paths: paths.to_vec(),
            caller_reference: caller_reference(),
        };
        match cdn.create_invalidation(request).await {
            Ok(invalidation_id) => receipts.push(InvalidationReceipt {
                distribution_id: distribution_id.clone(),
                invalidation_id,
            }),
            Err(source) => {
                error!(distribution_id = %distribution_id, error = %source, "Invalidation failed");
                failures.push(DistributionFailure {
                    distribution_id: distribution_id.clone(),
                    source,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(receipts)
    } else {
        Err(InvalidationError { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockCdnInvalidator;
    use crate::plan::{build_plan, PlanOptions, Target};
    use crate::remote::RemoteFile;
    use crate::scan::LocalFile;
    use mockall::predicate::function;

    fn changed_plan() -> SyncPlan {
        let local = |key: &str, hash: &str| LocalFile {
            path: format!("/build/{key}").into(),
            key: key.to_string(),
            size: 1,
            hash: hash.to_string(),
        };
        let remote = |key: &str, etag: &str| RemoteFile {
            key: key.to_string(),
            etag: etag.to_string(),
            size: 1,
            last_modified: None,
        };
        build_plan(
            vec![local("index.html", "new"), local("app.js", "same"), local("new.js", "n")],
            vec![remote("index.html", "old"), remote("app.js", "same")],
            &Target::default(),
            &PlanOptions::default(),
        )
    }

    #[test]
    fn invalidates_updated_keys_plus_extra_paths() {
        let paths = plan_invalidations(&changed_plan(), &["/static/*".to_string()]);
        assert_eq!(paths, vec!["/index.html", "/static/*"]);
    }

    #[test]
    fn invalidation_paths_include_the_bucket_prefix() {
        let mut plan = changed_plan();
        plan.prefix = Some("app/".into());
        assert_eq!(plan_invalidations(&plan, &[]), vec!["/app/index.html"]);
    }

    #[test]
    fn standalone_defaults_to_everything() {
        assert_eq!(standalone_paths(&[]), vec!["/*"]);
        assert_eq!(standalone_paths(&["/a".to_string()]), vec!["/a"]);
    }

    #[test]
    fn caller_reference_is_a_utc_timestamp() {
        let reference = caller_reference();
        assert!(reference.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&reference).is_ok());
    }

    #[tokio::test]
    async fn one_request_per_distribution_with_all_paths() {
        let mut cdn = MockCdnInvalidator::new();
        cdn.expect_create_invalidation()
            .with(function(|req: &InvalidationRequest| {
                req.paths == vec!["/index.html".to_string(), "/*".to_string()]
            }))
            .times(2)
            .returning(|req| Ok(Some(format!("inv-{}", req.distribution_id))));

        let receipts = execute_invalidations(
            &cdn,
            &["/index.html".to_string(), "/*".to_string()],
            &["E1".to_string(), "E2".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[1].invalidation_id.as_deref(), Some("inv-E2"));
    }

    #[tokio::test]
    async fn failing_distribution_does_not_skip_the_rest() {
        let mut cdn = MockCdnInvalidator::new();
        cdn.expect_create_invalidation()
            .times(3)
            .returning(|req| match req.distribution_id.as_str() {
                "BAD" => Err("throttled".into()),
                _ => Ok(None),
            });

        let err = execute_invalidations(
            &cdn,
            &["/index.html".to_string()],
            &["E1".to_string(), "BAD".to_string(), "E3".to_string()],
        )
        .await
        .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].distribution_id, "BAD");
        assert!(err.to_string().contains("BAD (throttled)"));
    }

    #[tokio::test]
    async fn nothing_to_invalidate_makes_no_calls() {
        let cdn = MockCdnInvalidator::new();
        assert!(execute_invalidations(&cdn, &[], &["E1".to_string()])
            .await
            .unwrap()
            .is_empty());
        assert!(execute_invalidations(&cdn, &["/a".to_string()], &[])
            .await
            .unwrap()
            .is_empty());
    }
}
