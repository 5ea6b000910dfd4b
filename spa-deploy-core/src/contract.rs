//! # contract: backend interfaces for the deploy pipeline
//!
//! The planner and executor never talk to a cloud SDK directly. They go through two
//! traits:
//!
//! - [`ObjectStore`]: paginated listing, upload and delete of bucket objects.
//! - [`CdnInvalidator`]: one invalidation batch per CDN distribution.
//!
//! Request and response types are plain owned data so they can cross the async trait
//! boundary and be matched on in mock expectations.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`; with the `test-export-mocks` feature (on by
//! default) downstream crates get `MockObjectStore` and `MockCdnInvalidator` too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Error returned by backend implementations.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// One page request against the bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: Option<String>,
    /// Token returned by the previous page; `None` for the first page.
    pub continuation_token: Option<String>,
}

/// A listed object as the backend reported it, before validation.
#[derive(Debug, Clone, Default)]
pub struct ObjectSummary {
    pub key: Option<String>,
    pub e_tag: Option<String>,
    pub size: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Present while more pages remain.
    pub next_continuation_token: Option<String>,
}

/// Everything needed for a single PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub acl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteObjectRequest {
    pub bucket: String,
    pub key: String,
}

/// A CDN invalidation batch for one distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub paths: Vec<String>,
    /// Unique per request; the CDN rejects a repeated reference.
    pub caller_reference: String,
}

/// Object storage holding the deployed app.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of the bucket listing.
    async fn list_objects(&self, req: ListObjectsRequest) -> Result<ListPage, BackendError>;

    /// Upload (create or replace) one object.
    async fn put_object(&self, req: PutObjectRequest) -> Result<(), BackendError>;

    /// Remove one object by key.
    async fn delete_object(&self, req: DeleteObjectRequest) -> Result<(), BackendError>;
}

/// CDN in front of the bucket.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CdnInvalidator: Send + Sync {
    /// Submit an invalidation batch, returning the backend's invalidation id if it gave one.
    async fn create_invalidation(
        &self,
        req: InvalidationRequest,
    ) -> Result<Option<String>, BackendError>;
}
