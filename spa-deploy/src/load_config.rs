//! `load_config` module: parses the YAML deploy config and maps it onto the core's [`DeployConfig`].
//!
//! This is the only place where the user-supplied YAML is read. Everything downstream works
//! with strongly-typed values.
//!
//! # Responsibilities
//! - Parse the YAML file into loosely-typed sections (every key optional)
//! - Accept either a scalar or a list wherever several values make sense
//! - Expand `deploy:` entries into targets that inherit unset keys from the top level
//! - Resolve the build path against the working directory
//! - Fill the CloudFront endpoint from `AWS_CLOUDFRONT_ENDPOINT` when the file sets none
//!
//! Required values (region, bucket) are checked by [`DeployConfig::validate`], not here.
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Deserialize;
use spa_deploy_core::config::DeployConfig;
use spa_deploy_core::error::ConfigError;
use tracing::{error, info};

pub const DEFAULT_CONFIG_FILE: &str = "spa-deploy.yaml";
pub const DEFAULT_BUILD_PATH: &str = "dist";
pub const CLOUDFRONT_ENDPOINT_ENV: &str = "AWS_CLOUDFRONT_ENDPOINT";

/// A YAML value given either as a single item or as a list of items.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }
}

fn list<T: Clone>(value: &Option<OneOrMany<T>>) -> Vec<T> {
    value.clone().map(Vec::from).unwrap_or_default()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsSection {
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Section {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub invalidate_glob: Option<OneOrMany<String>>,
    pub acl: Option<String>,
    pub purge: Option<bool>,
    pub force: Option<bool>,
}

impl S3Section {
    fn inherit(self, base: &S3Section) -> Self {
        Self {
            region: self.region.or_else(|| base.region.clone()),
            endpoint: self.endpoint.or_else(|| base.endpoint.clone()),
            bucket: self.bucket.or_else(|| base.bucket.clone()),
            prefix: self.prefix.or_else(|| base.prefix.clone()),
            invalidate_glob: self.invalidate_glob.or_else(|| base.invalidate_glob.clone()),
            acl: self.acl.or_else(|| base.acl.clone()),
            purge: self.purge.or(base.purge),
            force: self.force.or(base.force),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CloudFrontSection {
    pub distribution_id: Option<OneOrMany<String>>,
    pub invalidate_paths: Option<OneOrMany<String>>,
    pub endpoint: Option<String>,
}

impl CloudFrontSection {
    fn inherit(self, base: &CloudFrontSection) -> Self {
        Self {
            distribution_id: self.distribution_id.or_else(|| base.distribution_id.clone()),
            invalidate_paths: self.invalidate_paths.or_else(|| base.invalidate_paths.clone()),
            endpoint: self.endpoint.or_else(|| base.endpoint.clone()),
        }
    }
}

/// One deploy target: a build directory and the bucket and distributions it goes to.
///
/// The top level of the file is itself a target. Entries under `deploy:` inherit every
/// key they leave unset from it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    pub name: Option<String>,
    pub build_path: Option<PathBuf>,
    pub include_glob: Option<OneOrMany<String>>,
    pub ignore_glob: Option<OneOrMany<String>>,
    pub index_glob: Option<OneOrMany<String>>,
    pub s3: S3Section,
    pub cloudfront: CloudFrontSection,
}

/// A runtime config file written by `inject`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InjectSection {
    pub name: Option<String>,
    /// Output file, relative to the project directory. Its extension picks the format.
    pub destination: PathBuf,
    /// HTML page to inject into; defaults to `destination` itself.
    pub source: Option<PathBuf>,
    pub values: BTreeMap<String, serde_yaml::Value>,
}

/// The deploy config file as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub defaults: TargetSection,
    pub deploy: Option<OneOrMany<TargetSection>>,
    pub inject: Option<OneOrMany<InjectSection>>,
    pub globals: BTreeMap<String, serde_yaml::Value>,
    pub aws: AwsSection,
}

/// Deploy switches that come from the command line rather than the file.
#[derive(Debug, Clone, Copy)]
pub struct DeployFlags {
    pub purge: bool,
    pub force: bool,
    pub concurrency: usize,
}

impl Default for DeployFlags {
    fn default() -> Self {
        Self {
            purge: false,
            force: false,
            concurrency: 1,
        }
    }
}

impl CliConfig {
    /// Configured globals as strings; scalars are written the way YAML spells them.
    pub fn string_globals(&self) -> BTreeMap<String, String> {
        self.globals
            .iter()
            .map(|(key, value)| (key.clone(), yaml_scalar(value)))
            .collect()
    }

    /// Deploy targets in file order, with inherited keys filled in. `name` keeps only the
    /// target of that name and fails when there is none.
    pub fn targets(&self, name: Option<&str>) -> Result<Vec<TargetSection>> {
        let targets: Vec<TargetSection> = match &self.deploy {
            Some(deploy) => Vec::from(deploy.clone())
                .into_iter()
                .map(|target| target.inherit(&self.defaults))
                .collect(),
            None => vec![self.defaults.clone()],
        };
        let targets: Vec<TargetSection> = targets
            .into_iter()
            .map(|target| target.with_aws(&self.aws))
            .collect();
        select_named(targets, name, "deploy", |t| t.name.as_deref())
    }

    /// Files `inject` writes, in file order. `name` filters like [`CliConfig::targets`].
    pub fn inject_items(&self, name: Option<&str>) -> Result<Vec<InjectSection>> {
        select_named(list(&self.inject), name, "inject", |i| i.name.as_deref())
    }
}

fn select_named<T>(
    items: Vec<T>,
    name: Option<&str>,
    kind: &str,
    name_of: impl Fn(&T) -> Option<&str>,
) -> Result<Vec<T>> {
    let Some(wanted) = name else {
        return Ok(items);
    };
    let selected: Vec<T> = items
        .into_iter()
        .filter(|item| name_of(item) == Some(wanted))
        .collect();
    if selected.is_empty() {
        return Err(anyhow!("No {kind} target named '{wanted}' in the config file"));
    }
    Ok(selected)
}

impl TargetSection {
    fn inherit(self, base: &TargetSection) -> Self {
        Self {
            name: self.name,
            build_path: self.build_path.or_else(|| base.build_path.clone()),
            include_glob: self.include_glob.or_else(|| base.include_glob.clone()),
            ignore_glob: self.ignore_glob.or_else(|| base.ignore_glob.clone()),
            index_glob: self.index_glob.or_else(|| base.index_glob.clone()),
            s3: self.s3.inherit(&base.s3),
            cloudfront: self.cloudfront.inherit(&base.cloudfront),
        }
    }

    fn with_aws(mut self, aws: &AwsSection) -> Self {
        self.s3.region = self.s3.region.or_else(|| aws.region.clone());
        self.s3.endpoint = self.s3.endpoint.or_else(|| aws.endpoint.clone());
        self
    }

    /// Name used in logs and prompts.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }

    pub fn distribution_ids(&self) -> Vec<String> {
        list(&self.cloudfront.distribution_id)
    }

    pub fn invalidate_paths(&self) -> Vec<String> {
        list(&self.cloudfront.invalidate_paths)
    }

    pub fn cloudfront_endpoint(&self) -> Option<String> {
        self.cloudfront
            .endpoint
            .clone()
            .or_else(|| std::env::var(CLOUDFRONT_ENDPOINT_ENV).ok())
            .filter(|endpoint| !endpoint.is_empty())
    }

    pub fn region(&self) -> Result<&str, ConfigError> {
        self.s3
            .region
            .as_deref()
            .filter(|region| !region.trim().is_empty())
            .ok_or(ConfigError::MissingRegion)
    }

    /// Resolve this target against `pwd` into the core's config. Flags can switch
    /// `purge`/`force` on but never off.
    pub fn deploy_config(
        &self,
        pwd: &Path,
        globals: BTreeMap<String, String>,
        flags: DeployFlags,
    ) -> DeployConfig {
        let build_path = self
            .build_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_PATH));
        DeployConfig {
            name: self.name.clone(),
            build_path: pwd.join(build_path),
            include_glob: list(&self.include_glob),
            ignore_glob: list(&self.ignore_glob),
            region: self.s3.region.clone().unwrap_or_default(),
            bucket: self.s3.bucket.clone().unwrap_or_default(),
            endpoint: self.s3.endpoint.clone(),
            prefix: self.s3.prefix.clone(),
            invalidate_glob: list(&self.s3.invalidate_glob),
            acl: self.s3.acl.clone(),
            purge: flags.purge || self.s3.purge.unwrap_or(false),
            force: flags.force || self.s3.force.unwrap_or(false),
            distribution_ids: self.distribution_ids(),
            invalidate_paths: self.invalidate_paths(),
            cloudfront_endpoint: self.cloudfront_endpoint(),
            index_glob: list(&self.index_glob),
            globals,
            concurrency: flags.concurrency.max(1),
        }
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Read and parse the YAML config at `path`. An empty file is an empty config.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    if content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(CliConfig::default());
    }

    let config: CliConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> CliConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn scalar_or_list_both_become_lists() {
        let config = parse("cloudfront:\n  distribution_id: E1\n  invalidate_paths: [\"/a\", \"/b\"]\n");
        let target = &config.targets(None).unwrap()[0];
        assert_eq!(target.distribution_ids(), vec!["E1"]);
        assert_eq!(target.invalidate_paths(), vec!["/a", "/b"]);
    }

    #[test]
    fn build_path_defaults_to_dist_under_pwd() {
        let config = CliConfig::default();
        let targets = config.targets(None).unwrap();
        assert_eq!(targets.len(), 1);
        let deploy = targets[0].deploy_config(
            Path::new("/work/app"),
            BTreeMap::new(),
            DeployFlags::default(),
        );
        assert_eq!(deploy.build_path, PathBuf::from("/work/app/dist"));
        assert_eq!(deploy.concurrency, 1);
        assert_eq!(deploy.name, None);
        assert!(deploy.region.is_empty());
    }

    #[test]
    fn globals_are_stringified() {
        let config = parse("globals:\n  RETRIES: 3\n  DEBUG: false\n  NAME: app\n");
        let globals = config.string_globals();
        assert_eq!(globals["RETRIES"], "3");
        assert_eq!(globals["DEBUG"], "false");
        assert_eq!(globals["NAME"], "app");
    }

    #[test]
    fn missing_region_is_a_config_error() {
        let target = TargetSection::default();
        assert!(matches!(target.region(), Err(ConfigError::MissingRegion)));
    }

    #[test]
    fn deploy_list_entries_inherit_top_level_keys() {
        let config = parse(
            r#"
aws:
  region: eu-west-1
build_path: build
s3:
  acl: public-read
deploy:
  - name: web
    s3:
      bucket: web-bucket
  - name: admin
    build_path: admin/build
    s3:
      bucket: admin-bucket
      region: us-east-1
      purge: true
"#,
        );
        let targets = config.targets(None).unwrap();
        let names: Vec<&str> = targets.iter().map(TargetSection::label).collect();
        assert_eq!(names, vec!["web", "admin"]);

        let web = targets[0].deploy_config(Path::new("/p"), BTreeMap::new(), DeployFlags::default());
        assert_eq!(web.name.as_deref(), Some("web"));
        assert_eq!(web.build_path, PathBuf::from("/p/build"));
        assert_eq!(web.region, "eu-west-1");
        assert_eq!(web.bucket, "web-bucket");
        assert_eq!(web.acl.as_deref(), Some("public-read"));
        assert!(!web.purge);

        let admin = targets[1].deploy_config(Path::new("/p"), BTreeMap::new(), DeployFlags::default());
        assert_eq!(admin.build_path, PathBuf::from("/p/admin/build"));
        assert_eq!(admin.region, "us-east-1");
        assert!(admin.purge);
    }

    #[test]
    fn single_deploy_entry_is_accepted() {
        let config = parse("deploy:\n  name: only\n  s3:\n    bucket: b\n");
        let targets = config.targets(None).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].s3.bucket.as_deref(), Some("b"));
    }

    #[test]
    fn target_filter_selects_by_name() {
        let config = parse("deploy:\n  - name: a\n  - name: b\n");
        let selected = config.targets(Some("b")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].label(), "b");

        let err = config.targets(Some("c")).unwrap_err();
        assert!(err.to_string().contains("No deploy target named 'c'"));
    }

    #[test]
    fn flags_only_switch_purge_and_force_on() {
        let config = parse("s3:\n  force: true\n");
        let target = &config.targets(None).unwrap()[0];
        let deploy = target.deploy_config(
            Path::new("."),
            BTreeMap::new(),
            DeployFlags {
                purge: true,
                force: false,
                concurrency: 0,
            },
        );
        assert!(deploy.purge);
        assert!(deploy.force);
        assert_eq!(deploy.concurrency, 1);
    }

    #[test]
    fn inject_items_parse_and_filter() {
        let config = parse(
            r#"
inject:
  - name: web
    destination: public/env.json
    values:
      API_URL: https://api.example.com
  - name: html
    destination: dist/index.html
    source: src/index.html
"#,
        );
        let items = config.inject_items(None).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].destination, PathBuf::from("public/env.json"));
        assert_eq!(items[1].source, Some(PathBuf::from("src/index.html")));

        assert_eq!(config.inject_items(Some("html")).unwrap().len(), 1);
        assert!(config.inject_items(Some("nope")).is_err());
        assert!(CliConfig::default().inject_items(None).unwrap().is_empty());
    }
}
