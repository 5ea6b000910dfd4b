use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::ConfigError;
use crate::glob::GlobList;
use crate::plan::{normalize_prefix, PlanOptions, Target};
use crate::scan::ScanOptions;

/// Everything one deploy needs, resolved from the config file and CLI flags.
#[derive(Debug, Clone, Default)]
pub struct DeployConfig {
    /// Deploy target name, when the config file defines several.
    pub name: Option<String>,
    /// Directory holding the built app.
    pub build_path: PathBuf,
    /// Only keys matching these are deployed; empty means all files.
    pub include_glob: Vec<String>,
    pub ignore_glob: Vec<String>,

    pub region: String,
    pub bucket: String,
    /// S3-compatible endpoint override (MinIO, LocalStack, R2...).
    pub endpoint: Option<String>,
    pub prefix: Option<String>,
    /// Matching keys are served uncached and invalidated when they change.
    pub invalidate_glob: Vec<String>,
    pub acl: Option<String>,

    pub purge: bool,
    pub force: bool,

    pub distribution_ids: Vec<String>,
    /// Extra CDN paths invalidated on every deploy.
    pub invalidate_paths: Vec<String>,
    pub cloudfront_endpoint: Option<String>,

    /// Keys whose HTML gets the runtime globals injected.
    pub index_glob: Vec<String>,
    pub globals: BTreeMap<String, String>,

    /// Upper bound on in-flight uploads/deletes within one plan tier.
    pub concurrency: usize,
}

impl DeployConfig {
    /// Check what can be checked before any network call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        if !self.build_path.is_dir() {
            return Err(ConfigError::NotADirectory(self.build_path.clone()));
        }
        GlobList::new(&self.include_glob)?;
        GlobList::new(&self.ignore_glob)?;
        GlobList::new(&self.invalidate_glob)?;
        GlobList::new(&self.index_glob)?;
        Ok(())
    }

    pub fn target(&self) -> Target {
        Target {
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            endpoint: self.endpoint.clone(),
            prefix: normalize_prefix(self.prefix.as_deref()),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            root: self.build_path.clone(),
            include_glob: self.include_glob.clone(),
            ignore_glob: self.ignore_glob.clone(),
        }
    }

    pub fn plan_options(&self) -> Result<PlanOptions, ConfigError> {
        Ok(PlanOptions {
            purge: self.purge,
            force: self.force,
            invalidate_glob: GlobList::new(&self.invalidate_glob)?,
            acl: self.acl.clone(),
        })
    }

    pub fn trace_loaded(&self) {
        info!(
            deploy_target = self.name.as_deref().unwrap_or("-"),
            build_path = %self.build_path.display(),
            region = %self.region,
            bucket = %self.bucket,
            endpoint = self.endpoint.as_deref().unwrap_or("-"),
            prefix = self.prefix.as_deref().unwrap_or("-"),
            purge = self.purge,
            force = self.force,
            distributions = self.distribution_ids.len(),
            "Loaded deploy config"
        );
        for (key, value) in &self.globals {
            info!(key = %key, value = %value, "App global");
        }
        debug!(?self, "Deploy config (full debug)");
    }
}
