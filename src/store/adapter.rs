//! Thin adapter over the AWS S3 SDK
//!
//! Every call into `aws-sdk-s3` lives here; the rest of the crate sees only
//! the vendor-free types from [`super::types`]. Keeping the vendor surface in
//! one module is what makes the core portable between S3-compatible
//! back-ends.

use std::collections::HashMap;
use std::time::SystemTime;

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, MetadataDirective, ObjectCannedAcl,
    StorageClass as AwsStorageClass,
};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;

use crate::config::ClientConfig;
use crate::error::{Result, StoreError};

use super::types::{
    CannedAcl, CompletedPartInfo, ListResult, ListedObject, ObjectAclSummary, ObjectHead,
    ObjectRef, PendingUpload, StorageClass,
};

/// Adapter owning the low-level S3 client
#[derive(Clone)]
pub struct StoreAdapter {
    client: AwsS3Client,
}

impl StoreAdapter {
    /// Build the adapter from client configuration
    pub async fn new(config: &ClientConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        let region_provider = if let Some(region) = &config.region {
            RegionProviderChain::first_try(Region::new(region.clone()))
        } else {
            RegionProviderChain::default_provider()
        };
        loader = loader.region(region_provider);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials = Credentials::new(
                access_key,
                secret_key,
                config.session_token.clone(),
                None,
                "s3tool-explicit",
            );
            loader = loader.credentials_provider(credentials);
        }

        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(config.timeout())
            .build();
        builder = builder.timeout_config(timeout_config);

        Ok(Self {
            client: AwsS3Client::from_conf(builder.build()),
        })
    }

    /// Head an object, returning its stored size, ETag and metadata
    pub async fn head_object(&self, target: &ObjectRef) -> Result<ObjectHead> {
        let response = self
            .client
            .head_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .set_version_id(target.version.clone())
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(ObjectHead {
            size: response.content_length().unwrap_or(0) as u64,
            etag: response.e_tag().map(|s| s.to_string()),
            metadata: response
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            version_id: response.version_id().map(|s| s.to_string()),
            last_modified: response
                .last_modified()
                .and_then(|dt| SystemTime::try_from(*dt).ok()),
        })
    }

    /// List objects under a prefix, following continuation tokens to the end
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<ListResult> {
        let mut result = ListResult::default();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take());
            if let Some(delimiter) = delimiter {
                request = request.delimiter(delimiter);
            }

            let response = request.send().await.map_err(map_sdk_error)?;

            for obj in response.contents() {
                let Some(key) = obj.key() else { continue };
                result.objects.push(ListedObject {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .and_then(|dt| SystemTime::try_from(*dt).ok()),
                    etag: obj.e_tag().map(|s| s.to_string()),
                });
            }
            result.common_prefixes.extend(
                response
                    .common_prefixes()
                    .iter()
                    .filter_map(|cp| cp.prefix().map(|s| s.to_string())),
            );

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                return Ok(result);
            }
        }
    }

    /// List all buckets visible to the credentials
    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(|s| s.to_string()))
            .collect())
    }

    /// Open a multipart session, stamping the given metadata on the object
    pub async fn initiate_multipart(
        &self,
        dest: &ObjectRef,
        metadata: &HashMap<String, String>,
        acl: CannedAcl,
        storage_class: Option<StorageClass>,
    ) -> Result<String> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .set_metadata(Some(metadata.clone()))
            .acl(to_aws_acl(acl));
        if let Some(sc) = storage_class {
            request = request.storage_class(to_aws_storage_class(sc));
        }

        let response = request.send().await.map_err(map_sdk_error)?;
        response
            .upload_id()
            .map(|s| s.to_string())
            .ok_or_else(|| StoreError::Network("no upload ID returned".to_string()))
    }

    /// Upload one part of a multipart session
    pub async fn upload_part(
        &self,
        dest: &ObjectRef,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPartInfo> {
        let response = self
            .client
            .upload_part()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let etag = response
            .e_tag()
            .ok_or_else(|| StoreError::Network("no ETag returned for part".to_string()))?
            .to_string();

        Ok(CompletedPartInfo { part_number, etag })
    }

    /// Server-side copy of one part. `range` is inclusive stored-byte bounds;
    /// `None` performs the whole-object copy used for zero-length sources.
    pub async fn copy_part(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        upload_id: &str,
        part_number: i32,
        range: Option<(u64, u64)>,
    ) -> Result<CompletedPartInfo> {
        let mut request = self
            .client
            .upload_part_copy()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .copy_source(copy_source_of(source));
        if let Some((start, end)) = range {
            request = request.copy_source_range(format!("bytes={}-{}", start, end));
        }

        let response = request.send().await.map_err(map_sdk_error)?;
        let etag = response
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .ok_or_else(|| StoreError::Network("no ETag returned for copied part".to_string()))?
            .to_string();

        Ok(CompletedPartInfo { part_number, etag })
    }

    /// Complete a multipart session from its ordered part list
    pub async fn complete_multipart(
        &self,
        dest: &ObjectRef,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> Result<String> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(response.e_tag().unwrap_or_default().to_string())
    }

    /// Abort a multipart session
    pub async fn abort_multipart(&self, dest: &ObjectRef, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    /// List in-progress multipart sessions under a prefix
    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<PendingUpload>> {
        let mut pending = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_multipart_uploads()
                .bucket(bucket)
                .prefix(prefix)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(map_sdk_error)?;

            for upload in response.uploads() {
                let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) else {
                    continue;
                };
                pending.push(PendingUpload {
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                    initiated: upload
                        .initiated()
                        .and_then(|dt| SystemTime::try_from(*dt).ok()),
                });
            }

            if response.is_truncated().unwrap_or(false) {
                key_marker = response.next_key_marker().map(|s| s.to_string());
                upload_id_marker = response.next_upload_id_marker().map(|s| s.to_string());
            } else {
                return Ok(pending);
            }
        }
    }

    /// Fetch an inclusive byte range of an object
    pub async fn get_range(&self, source: &ObjectRef, start: u64, end: u64) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&source.bucket)
            .key(&source.key)
            .set_version_id(source.version.clone())
            .range(format!("bytes={}-{}", start, end))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Network(format!("failed to read response body: {}", e)))?;
        Ok(body.into_bytes())
    }

    /// Self-copy an object, replacing its user metadata. This is how object
    /// metadata is rewritten in place on S3.
    pub async fn copy_object_replace_metadata(
        &self,
        target: &ObjectRef,
        metadata: &HashMap<String, String>,
    ) -> Result<Option<String>> {
        let response = self
            .client
            .copy_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .copy_source(copy_source_of(target))
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata.clone()))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(response
            .copy_object_result()
            .and_then(|r| r.e_tag())
            .map(|s| s.to_string()))
    }

    /// Delete an object
    pub async fn delete(&self, target: &ObjectRef) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .set_version_id(target.version.clone())
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    /// Read an object's access control list
    pub async fn get_object_acl(&self, target: &ObjectRef) -> Result<ObjectAclSummary> {
        let response = self
            .client
            .get_object_acl()
            .bucket(&target.bucket)
            .key(&target.key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(ObjectAclSummary {
            owner: response
                .owner()
                .and_then(|o| o.display_name().or(o.id()).map(|s| s.to_string())),
            grants: response
                .grants()
                .iter()
                .filter_map(|g| {
                    let grantee = g
                        .grantee()
                        .and_then(|gr| gr.display_name().or(gr.id()).or(gr.uri()))?
                        .to_string();
                    let permission = g.permission()?.as_str().to_string();
                    Some((grantee, permission))
                })
                .collect(),
        })
    }

    /// Apply a canned ACL to an object
    pub async fn set_object_acl(&self, target: &ObjectRef, acl: CannedAcl) -> Result<()> {
        self.client
            .put_object_acl()
            .bucket(&target.bucket)
            .key(&target.key)
            .acl(to_aws_acl(acl))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}

/// The `copy_source` header form of an object reference
fn copy_source_of(source: &ObjectRef) -> String {
    match &source.version {
        Some(v) => format!("{}/{}?versionId={}", source.bucket, source.key, v),
        None => format!("{}/{}", source.bucket, source.key),
    }
}

fn to_aws_acl(acl: CannedAcl) -> ObjectCannedAcl {
    match acl {
        CannedAcl::Private => ObjectCannedAcl::Private,
        CannedAcl::PublicRead => ObjectCannedAcl::PublicRead,
        CannedAcl::PublicReadWrite => ObjectCannedAcl::PublicReadWrite,
        CannedAcl::AuthenticatedRead => ObjectCannedAcl::AuthenticatedRead,
        CannedAcl::BucketOwnerRead => ObjectCannedAcl::BucketOwnerRead,
        CannedAcl::BucketOwnerFullControl => ObjectCannedAcl::BucketOwnerFullControl,
    }
}

fn to_aws_storage_class(sc: StorageClass) -> AwsStorageClass {
    match sc {
        StorageClass::Standard => AwsStorageClass::Standard,
        StorageClass::StandardIa => AwsStorageClass::StandardIa,
        StorageClass::OnezoneIa => AwsStorageClass::OnezoneIa,
        StorageClass::IntelligentTiering => AwsStorageClass::IntelligentTiering,
        StorageClass::ReducedRedundancy => AwsStorageClass::ReducedRedundancy,
    }
}

/// Convert an SDK error into the crate's error model, preserving the service
/// error code and HTTP status that drive retry classification.
fn map_sdk_error<E>(err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) => StoreError::Timeout(err.to_string()),
        SdkError::DispatchFailure(failure) => {
            if failure.is_timeout() {
                StoreError::Timeout(format!("{:?}", failure))
            } else {
                StoreError::Network(format!("dispatch failure: {:?}", failure))
            }
        }
        SdkError::ResponseError(response) => {
            StoreError::Network(format!("response error: {:?}", response))
        }
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            let code = err.code().unwrap_or("Unknown").to_string();
            let message = err
                .message()
                .map(|s| s.to_string())
                .unwrap_or_else(|| err.to_string());
            if status == 429 {
                StoreError::Throttled(format!("({}) {}", code, message))
            } else {
                StoreError::Service {
                    code,
                    status,
                    message,
                }
            }
        }
        _ => StoreError::Network(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfigBuilder;

    #[tokio::test]
    async fn test_adapter_builds_from_config() {
        let config = ClientConfigBuilder::new()
            .region("us-east-1")
            .endpoint("http://localhost:9000")
            .credentials("test", "test")
            .force_path_style(true)
            .build()
            .unwrap();

        // Construction must not require network access
        assert!(StoreAdapter::new(&config).await.is_ok());
    }

    #[test]
    fn test_copy_source_formats() {
        let r = ObjectRef::new("bucket", "dir/key");
        assert_eq!(copy_source_of(&r), "bucket/dir/key");

        let mut r = ObjectRef::new("bucket", "key");
        r.version = Some("v7".to_string());
        assert_eq!(copy_source_of(&r), "bucket/key?versionId=v7");
    }
}
