//! # AWS backends
//!
//! [`S3Store`] and [`CloudFrontInvalidator`] implement the core's backend traits with the
//! AWS SDK. Credentials come from the default provider chain (env, profile, SSO, instance
//! metadata); only the region and optional endpoints are configured here.
//!
//! An endpoint override switches S3 to path-style addressing so MinIO, LocalStack and
//! similar S3-compatible stores work without wildcard DNS.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use chrono::{DateTime, Utc};
use spa_deploy_core::contract::{
    BackendError, CdnInvalidator, DeleteObjectRequest, InvalidationRequest, ListObjectsRequest,
    ListPage, ObjectStore, ObjectSummary, PutObjectRequest,
};
use tracing::{debug, info};

/// Shared SDK config for `region`, credentials from the default chain.
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

fn backend_error<E>(err: E) -> BackendError
where
    E: std::error::Error + 'static,
{
    DisplayErrorContext(err).to_string().into()
}

fn to_utc(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(sdk_config: &SdkConfig, endpoint: Option<&str>) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(endpoint) = endpoint {
            info!(endpoint, "Using custom S3 endpoint with path-style addressing");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(&self, req: ListObjectsRequest) -> Result<ListPage, BackendError> {
        debug!(bucket = %req.bucket, token = ?req.continuation_token, "Listing objects page");
        let output = self
            .client
            .list_objects_v2()
            .bucket(req.bucket)
            .set_prefix(req.prefix)
            .set_continuation_token(req.continuation_token)
            .send()
            .await
            .map_err(backend_error)?;

        let objects = output
            .contents()
            .iter()
            .map(|object| ObjectSummary {
                key: object.key().map(str::to_string),
                e_tag: object.e_tag().map(str::to_string),
                size: object.size(),
                last_modified: object.last_modified().and_then(to_utc),
            })
            .collect();

        Ok(ListPage {
            objects,
            next_continuation_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn put_object(&self, req: PutObjectRequest) -> Result<(), BackendError> {
        let mut request = self
            .client
            .put_object()
            .bucket(req.bucket)
            .key(req.key)
            .body(ByteStream::from(req.body))
            .set_cache_control(req.cache_control)
            .set_content_type(req.content_type)
            .set_content_disposition(req.content_disposition);
        if let Some(acl) = req.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        request.send().await.map_err(backend_error)?;
        Ok(())
    }

    async fn delete_object(&self, req: DeleteObjectRequest) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(req.bucket)
            .key(req.key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}

pub struct CloudFrontInvalidator {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontInvalidator {
    pub fn new(sdk_config: &SdkConfig, endpoint: Option<&str>) -> Self {
        let mut builder = aws_sdk_cloudfront::config::Builder::from(sdk_config);
        if let Some(endpoint) = endpoint {
            info!(endpoint, "Using custom CloudFront endpoint");
            builder = builder.endpoint_url(endpoint);
        }
        Self {
            client: aws_sdk_cloudfront::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl CdnInvalidator for CloudFrontInvalidator {
    async fn create_invalidation(
        &self,
        req: InvalidationRequest,
    ) -> Result<Option<String>, BackendError> {
        use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};

        let paths = Paths::builder()
            .quantity(i32::try_from(req.paths.len())?)
            .set_items(Some(req.paths))
            .build()?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(req.caller_reference)
            .build()?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(req.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(backend_error)?;

        Ok(output.invalidation().map(|inv| inv.id().to_string()))
    }
}
