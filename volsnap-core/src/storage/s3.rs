/*!
Amazon S3 storage backend.

Archives are streamed from and to disk with the official AWS SDK. Failures are
reported as [`VolsnapError::Storage`] and are not retried here.
*/

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::operation::put_object::builders::PutObjectFluentBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption, StorageClass};
use aws_sdk_s3::Client as S3Client;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{runtime, DestinationOptions, StorageBackend};
use crate::observability::record_object_store_call;
use crate::{Result, VolsnapError};

/// Upload options understood by [`S3StorageAdapter::put`]
pub const SUPPORTED_OPTIONS: &[&str] = &[
    "StorageClass",
    "ServerSideEncryption",
    "SSEKMSKeyId",
    "ACL",
    "ContentType",
    "CacheControl",
];

/// Amazon S3 storage backend
///
/// Credentials and region come from the standard AWS provider chain
/// (environment, shared config files, instance and task roles).
///
/// # Example
/// ```rust,no_run
/// use volsnap_core::storage::{S3StorageAdapter, StorageBackend};
/// use std::collections::BTreeMap;
///
/// let mut options = BTreeMap::new();
/// options.insert("StorageClass".to_string(), "STANDARD_IA".to_string());
///
/// let adapter = S3StorageAdapter::new("my-backups".to_string(), options)?;
/// adapter.put("/tmp/app-20200101-000000.tar.gz".as_ref(), "backups/app-20200101-000000.tar.gz")?;
/// # Ok::<(), volsnap_core::VolsnapError>(())
/// ```
#[derive(Debug)]
pub struct S3StorageAdapter {
    client: S3Client,
    bucket: String,
    options: DestinationOptions,
}

impl S3StorageAdapter {
    /// Create an adapter for `bucket` with upload `options`
    ///
    /// # Errors
    /// Returns an error if no AWS credentials provider can be configured.
    pub fn new(bucket: String, options: DestinationOptions) -> Result<Self> {
        let sdk_config = runtime().block_on(async {
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .load()
                .await
        });

        if sdk_config.credentials_provider().is_none() {
            return Err(VolsnapError::storage(
                "AWS credentials not found. Please set AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, and AWS_REGION environment variables",
            ));
        }

        Ok(Self::with_client(S3Client::new(&sdk_config), bucket, options))
    }

    /// Create an adapter around an existing client
    pub fn with_client(client: S3Client, bucket: String, options: DestinationOptions) -> Self {
        for name in unsupported_options(&options) {
            warn!(bucket = %bucket, option = %name, "Ignoring unsupported object store option");
        }
        info!(bucket = %bucket, "Initialized S3 storage backend");
        S3StorageAdapter {
            client,
            bucket,
            options,
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Read a whole object into memory; used for small documents such as configuration
    pub fn read_object(&self, key: &str) -> Result<Vec<u8>> {
        let started = Instant::now();
        let result: Result<Vec<u8>> = runtime().block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_s3_error("get_object", e, key))?;
            let data = output.body.collect().await.map_err(|e| {
                VolsnapError::storage(format!("Failed to read S3 object stream: {e}"))
            })?;
            Ok(data.into_bytes().to_vec())
        });
        record_object_store_call("get_object", started, result.is_ok());
        result
    }

    fn apply_options(&self, mut request: PutObjectFluentBuilder) -> PutObjectFluentBuilder {
        for (name, value) in &self.options {
            request = match name.as_str() {
                "StorageClass" => request.storage_class(StorageClass::from(value.as_str())),
                "ServerSideEncryption" => {
                    request.server_side_encryption(ServerSideEncryption::from(value.as_str()))
                }
                "SSEKMSKeyId" => request.ssekms_key_id(value),
                "ACL" => request.acl(ObjectCannedAcl::from(value.as_str())),
                "ContentType" => request.content_type(value),
                "CacheControl" => request.cache_control(value),
                _ => request,
            };
        }
        request
    }
}

impl StorageBackend for S3StorageAdapter {
    fn put(&self, local: &Path, key: &str) -> Result<()> {
        info!(
            bucket = %self.bucket,
            key = %key,
            file = %local.display(),
            "Uploading snapshot to S3"
        );

        let started = Instant::now();
        let result: Result<()> = runtime().block_on(async {
            let body = ByteStream::from_path(local).await.map_err(|e| {
                VolsnapError::storage(format!("Failed to open {} for upload: {e}", local.display()))
            })?;
            let request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(body);
            self.apply_options(request)
                .send()
                .await
                .map_err(|e| map_s3_error("put_object", e, key))?;
            Ok(())
        });
        record_object_store_call("put_object", started, result.is_ok());

        if let Err(e) = &result {
            error!(bucket = %self.bucket, key = %key, error = %e, "Failed to upload snapshot to S3");
        }
        result
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        debug!(bucket = %self.bucket, prefix = %prefix, "Listing S3 objects");

        let started = Instant::now();
        let result: Result<Vec<String>> = runtime().block_on(async {
            let mut keys = Vec::new();
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| map_s3_error("list_objects_v2", e, prefix))?;
                keys.extend(
                    page.contents()
                        .iter()
                        .filter_map(|object| object.key())
                        .map(str::to_string),
                );
            }
            Ok(keys)
        });
        record_object_store_call("list_objects_v2", started, result.is_ok());

        let mut keys = result?;
        keys.sort();
        debug!(bucket = %self.bucket, prefix = %prefix, count = keys.len(), "Listed S3 objects");
        Ok(keys)
    }

    fn get(&self, key: &str, local: &Path) -> Result<()> {
        info!(
            bucket = %self.bucket,
            key = %key,
            file = %local.display(),
            "Downloading snapshot from S3"
        );

        let started = Instant::now();
        let result: Result<()> = runtime().block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_s3_error("get_object", e, key))?;

            let mut body = Box::pin(output.body.into_async_read());
            let mut file = tokio::fs::File::create(local).await?;
            tokio::io::copy(&mut body, &mut file).await.map_err(|e| {
                VolsnapError::storage(format!("Failed to read S3 object stream: {e}"))
            })?;
            tokio::io::AsyncWriteExt::flush(&mut file).await?;
            Ok(())
        });
        record_object_store_call("get_object", started, result.is_ok());

        if let Err(e) = &result {
            error!(bucket = %self.bucket, key = %key, error = %e, "Failed to download snapshot from S3");
        }
        result
    }
}

/// Option names that `put` does not know how to apply
pub fn unsupported_options(options: &DestinationOptions) -> Vec<&str> {
    options
        .keys()
        .map(String::as_str)
        .filter(|name| !SUPPORTED_OPTIONS.contains(name))
        .collect()
}

/// Map AWS SDK errors to VolsnapError with appropriate context
fn map_s3_error<E: ProvideErrorMetadata + std::fmt::Debug>(
    op: &str,
    error: aws_sdk_s3::error::SdkError<E>,
    key: &str,
) -> VolsnapError {
    use aws_sdk_s3::error::SdkError;

    match &error {
        SdkError::DispatchFailure(dispatch_err) => {
            VolsnapError::storage(format!("S3 {op} request failed to dispatch: {dispatch_err:?}"))
        }
        SdkError::TimeoutError(_) => {
            VolsnapError::storage(format!("S3 {op} request timed out (key: {key})"))
        }
        SdkError::ResponseError(response_err) => {
            VolsnapError::storage(format!("S3 {op} response error: {response_err:?}"))
        }
        SdkError::ServiceError(service_err) => match service_err.err().code() {
            Some("NoSuchBucket") => VolsnapError::storage("S3 bucket not found"),
            Some("NoSuchKey") => VolsnapError::storage(format!("S3 object '{key}' not found")),
            Some("AccessDenied") | Some("Forbidden") => VolsnapError::storage(
                "Access denied to S3 (check credentials and permissions)",
            ),
            Some("InvalidBucketName") => VolsnapError::storage("Invalid S3 bucket name"),
            Some(code) => VolsnapError::storage(format!(
                "S3 service error ({}): {}",
                code,
                service_err.err().message().unwrap_or("Unknown error")
            )),
            None => VolsnapError::storage(format!("S3 {op} service error: {service_err:?}")),
        },
        _ => VolsnapError::storage(format!("S3 {op} error: {error}")),
    }
}
