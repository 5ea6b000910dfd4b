//! Sync plan: one reconciliation record per storage key.
//!
//! [`build_plan`] merges the local scan and the remote listing into a [`SyncPlan`] whose
//! items carry the action to take plus the caching and invalidation policy for the key.
//!
//! Items are ordered by action rank and, within one action, long-cached files first. This
//! puts hashed assets in the bucket before the uncached index pages that reference them.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::glob::GlobList;
use crate::remote::RemoteFile;
use crate::scan::LocalFile;

pub const CACHE_CONTROL_CACHED: &str = "max-age=2628000, public";
pub const CACHE_CONTROL_UNCACHED: &str = "public, must-revalidate";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const CONTENT_DISPOSITION_INLINE: &str = "inline";

/// What to do with one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    /// Remote-only key left alone because purge was not requested.
    Unknown,
    Ignore,
    Unchanged,
    Create,
    Update,
    Delete,
}

impl SyncAction {
    /// Position in apply order; lower ranks sort (and apply) first.
    pub fn rank(self) -> u8 {
        match self {
            SyncAction::Unknown => 0,
            SyncAction::Ignore => 1,
            SyncAction::Unchanged => 2,
            SyncAction::Create => 3,
            SyncAction::Update => 4,
            SyncAction::Delete => 5,
        }
    }

    /// Whether applying this action mutates the bucket.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            SyncAction::Create | SyncAction::Update | SyncAction::Delete
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::Unknown => "Unknown",
            SyncAction::Ignore => "Ignore",
            SyncAction::Unchanged => "Unchanged",
            SyncAction::Create => "Create",
            SyncAction::Update => "Update",
            SyncAction::Delete => "Delete",
        }
    }
}

impl Ord for SyncAction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for SyncAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    pub key: String,
    pub local: Option<LocalFile>,
    pub remote: Option<RemoteFile>,
    pub action: SyncAction,
    /// Served with a long-lived cache policy.
    pub cache: bool,
    pub cache_control: Option<String>,
    /// Purge this key from the CDN after deploy.
    pub invalidate: bool,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub acl: Option<String>,
    /// Rewritten content uploaded instead of the file at `local.path`.
    pub data: Option<Vec<u8>>,
    pub data_hash: Option<String>,
}

impl PlanItem {
    fn from_local(file: LocalFile, uncached: bool, acl: Option<String>) -> Self {
        let content_type = mime_guess::from_path(&file.path)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let cache_control = if uncached {
            CACHE_CONTROL_UNCACHED
        } else {
            CACHE_CONTROL_CACHED
        };
        PlanItem {
            key: file.key.clone(),
            local: Some(file),
            remote: None,
            action: SyncAction::Create,
            cache: !uncached,
            cache_control: Some(cache_control.to_string()),
            invalidate: false,
            content_type: Some(content_type),
            content_disposition: Some(CONTENT_DISPOSITION_INLINE.to_string()),
            acl,
            data: None,
            data_hash: None,
        }
    }

    fn from_remote(file: RemoteFile, action: SyncAction) -> Self {
        PlanItem {
            key: file.key.clone(),
            local: None,
            remote: Some(file),
            action,
            cache: false,
            cache_control: None,
            invalidate: false,
            content_type: None,
            content_disposition: None,
            acl: None,
            data: None,
            data_hash: None,
        }
    }
}

/// Knobs for [`build_plan`].
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Delete remote keys that have no local file.
    pub purge: bool,
    /// Upload even when the content hash matches the remote etag.
    pub force: bool,
    /// Keys served without long-lived caching.
    pub invalidate_glob: GlobList,
    pub acl: Option<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            purge: false,
            force: false,
            invalidate_glob: GlobList::empty(),
            acl: None,
        }
    }
}

/// Where the plan will be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub region: String,
    pub bucket: String,
    pub endpoint: Option<String>,
    /// Key prefix inside the bucket, normalized by [`normalize_prefix`].
    pub prefix: Option<String>,
}

/// Drops leading slashes and guarantees a trailing one, so `app` and `/app/` both
/// become `app/`. Blank prefixes collapse to `None`.
pub fn normalize_prefix(prefix: Option<&str>) -> Option<String> {
    let trimmed = prefix?.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.ends_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("{trimmed}/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub items: Vec<PlanItem>,
    pub region: String,
    pub bucket: String,
    pub endpoint: Option<String>,
    /// Plan keys are relative to this prefix; bucket keys are `prefix + key`.
    pub prefix: Option<String>,
}

impl SyncPlan {
    /// Full bucket key for a plan key.
    pub fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }

    /// Stable sort by action rank, cached items before uncached ones within a rank.
    pub fn sort(&mut self) {
        self.items.sort_by(compare_items);
    }

    /// True when applying the plan would touch the bucket.
    pub fn has_changes(&self) -> bool {
        self.items.iter().any(|item| item.action.is_mutating())
    }

    pub fn count(&self, action: SyncAction) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }

    pub fn get(&self, key: &str) -> Option<&PlanItem> {
        self.items.iter().find(|item| item.key == key)
    }
}

fn compare_items(a: &PlanItem, b: &PlanItem) -> Ordering {
    a.action.cmp(&b.action).then_with(|| b.cache.cmp(&a.cache))
}

/// Merge local and remote file sets into a sorted [`SyncPlan`].
///
/// Local files come first and default to [`SyncAction::Create`]. Remote files then either
/// attach to the existing item (Unchanged or Update depending on hash vs. etag) or become
/// remote-only items that are deleted with `purge` and left [`SyncAction::Unknown`]
/// otherwise. Input order does not matter.
pub fn build_plan<L, R>(local: L, remote: R, target: &Target, options: &PlanOptions) -> SyncPlan
where
    L: IntoIterator<Item = LocalFile>,
    R: IntoIterator<Item = RemoteFile>,
{
    let mut items: BTreeMap<String, PlanItem> = BTreeMap::new();

    for file in local {
        let uncached = options.invalidate_glob.is_match(&file.key);
        items
            .entry(file.key.clone())
            .or_insert_with(|| PlanItem::from_local(file, uncached, options.acl.clone()));
    }

    let remote_only_action = if options.purge {
        SyncAction::Delete
    } else {
        SyncAction::Unknown
    };

    for file in remote {
        let item = items
            .entry(file.key.clone())
            .or_insert_with(|| PlanItem::from_remote(file.clone(), remote_only_action));
        if item.remote.is_none() {
            item.remote = Some(file);
        }

        let (Some(local), Some(remote)) = (&item.local, &item.remote) else {
            continue;
        };
        if !options.force && local.hash == remote.etag {
            item.action = SyncAction::Unchanged;
        } else {
            item.action = SyncAction::Update;
            item.invalidate = true;
        }
        debug!(key = %item.key, action = %item.action, "Compared local and remote");
    }

    let mut plan = SyncPlan {
        items: items.into_values().collect(),
        region: target.region.clone(),
        bucket: target.bucket.clone(),
        endpoint: target.endpoint.clone(),
        prefix: target.prefix.clone(),
    };
    plan.sort();

    info!(
        bucket = %plan.bucket,
        items = plan.items.len(),
        create = plan.count(SyncAction::Create),
        update = plan.count(SyncAction::Update),
        delete = plan.count(SyncAction::Delete),
        unchanged = plan.count(SyncAction::Unchanged),
        unknown = plan.count(SyncAction::Unknown),
        "Built sync plan"
    );
    plan
}

/// Human-readable plan, one line per item. `Unchanged` rows are only shown when verbose.
pub fn render_plan(plan: &SyncPlan, verbose: bool) -> String {
    let mut lines = Vec::new();
    for item in &plan.items {
        if !verbose && item.action == SyncAction::Unchanged {
            continue;
        }
        let invalidate = if item.invalidate { "Invalidate" } else { "          " };
        let cache = match (item.cache, item.action) {
            (true, SyncAction::Unchanged) => "Cached",
            (true, _) => "Cache",
            (false, _) => "     ",
        };
        let data = if item.data.is_some() { "DATA  " } else { "      " };
        let detail = match &item.local {
            Some(local) => format!(
                "({}b {})",
                local.size,
                item.content_type.as_deref().unwrap_or("")
            ),
            None => String::new(),
        };
        lines.push(format!(
            "{:<9}{invalidate}\t{cache}\t{data} {} {detail}",
            item.action, item.key
        ));
    }
    lines.join("\n")
}
