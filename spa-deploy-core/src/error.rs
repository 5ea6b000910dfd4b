//! Error types for every stage of a deploy.
//!
//! Each stage has its own enum so callers can tell a bad config apart from a failed
//! upload; [`DeployError`] wraps them for the end-to-end pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::contract::BackendError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("AWS region is not set")]
    MissingRegion,
    #[error("S3 deploy bucket is not set")]
    MissingBucket,
    #[error("build path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("object listing failed: {0}")]
    Backend(#[source] BackendError),
    #[error("listed object is missing its {field}: {object}")]
    MissingField { field: &'static str, object: String },
}

#[derive(Debug, Error)]
#[error("failed to read index file {}: {source}", .path.display())]
pub struct InjectError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("no local file to upload for {0}")]
    MissingLocalFile(String),
    #[error("failed to read {} for upload: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error("delete of {key} failed: {source}")]
    Delete {
        key: String,
        #[source]
        source: BackendError,
    },
}

/// One distribution that rejected its invalidation batch.
#[derive(Debug)]
pub struct DistributionFailure {
    pub distribution_id: String,
    pub source: BackendError,
}

#[derive(Debug, Error)]
#[error("invalidation failed for {}", failed_ids(.failures))]
pub struct InvalidationError {
    pub failures: Vec<DistributionFailure>,
}

fn failed_ids(failures: &[DistributionFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.distribution_id, f.source))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    List(#[from] ListError),
    #[error(transparent)]
    Inject(#[from] InjectError),
    #[error(transparent)]
    Execute(#[from] ExecuteError),
    #[error(transparent)]
    Invalidation(#[from] InvalidationError),
}
