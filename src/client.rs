//! High-level store client
//!
//! The facade over the whole operation surface. One client owns the SDK
//! adapter, the key provider and the two bounded pools; every operation
//! snapshots its configuration at start, runs through the shared transfer
//! orchestration and surfaces a [`crate::store::types::S3File`] (or listing
//! data) on success.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::crypto::envelope::{recover_symmetric_key, wrap_symmetric_key};
use crate::crypto::keys::{DirKeyProvider, KeyProvider};
use crate::error::{Result, StoreError};
use crate::metadata::ObjectAnnotations;
use crate::options::{CopyOptions, DownloadOptions, ListOptions, UploadOptions};
use crate::progress::ProgressListenerFactory;
use crate::retry::execute_with_retry;
use crate::store::types::{ListResult, ObjectHead, ObjectRef, PendingUpload, S3File};
use crate::store::StoreAdapter;
use crate::transfer::{copy, directory, download, upload, TransferContext};

/// Client for chunked, parallel, optionally-encrypted transfers against an
/// S3-compatible object store.
///
/// # Example
///
/// ```no_run
/// use s3tool::client::StoreClient;
/// use s3tool::config::ClientConfigBuilder;
/// use s3tool::options::UploadOptionsBuilder;
/// use s3tool::store::types::ObjectRef;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfigBuilder::new()
///         .region("us-east-1")
///         .build()?;
///     let client = StoreClient::new(config).await?;
///
///     let options = UploadOptionsBuilder::new(
///         "data.bin",
///         ObjectRef::new("my-bucket", "backups/data.bin"),
///         client.config().chunk_size,
///     )
///     .enc_key("alice")
///     .build()?;
///
///     let uploaded = client.upload(options).await?;
///     println!("uploaded with etag {:?}", uploaded.etag);
///     Ok(())
/// }
/// ```
pub struct StoreClient {
    config: ClientConfig,
    adapter: Arc<StoreAdapter>,
    keys: Arc<dyn KeyProvider>,
    http_permits: Arc<Semaphore>,
    internal_permits: Arc<Semaphore>,
    cancel: CancellationToken,
    progress: Option<Arc<dyn ProgressListenerFactory>>,
}

impl StoreClient {
    /// Create a client with the default directory-backed key provider
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let keys = Arc::new(DirKeyProvider::new(config.key_directory.clone()));
        Self::with_key_provider(config, keys).await
    }

    /// Create a client with a custom key provider
    pub async fn with_key_provider(
        config: ClientConfig,
        keys: Arc<dyn KeyProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let adapter = Arc::new(StoreAdapter::new(&config).await?);
        let http_permits = Arc::new(Semaphore::new(config.http_concurrency));
        let internal_permits = Arc::new(Semaphore::new(config.internal_concurrency));

        Ok(Self {
            config,
            adapter,
            keys,
            http_permits,
            internal_permits,
            cancel: CancellationToken::new(),
            progress: None,
        })
    }

    /// Install a progress listener factory
    pub fn with_progress_factory(mut self, factory: Arc<dyn ProgressListenerFactory>) -> Self {
        self.progress = Some(factory);
        self
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn context(&self) -> TransferContext {
        TransferContext {
            adapter: self.adapter.clone(),
            keys: self.keys.clone(),
            retry: self.config.retry_config(),
            http_permits: self.http_permits.clone(),
            internal_permits: self.internal_permits.clone(),
            cancel: self.cancel.child_token(),
            progress: self.progress.clone(),
            default_chunk_size: self.config.chunk_size,
        }
    }

    /// Upload one local file
    pub async fn upload(&self, options: UploadOptions) -> Result<S3File> {
        if options.file.is_dir() {
            return Err(StoreError::Usage(format!(
                "'{}' is a directory, use upload_directory",
                options.file.display()
            )));
        }
        upload::upload(&self.context(), &options).await
    }

    /// Upload every file under a local directory; `options.file` names the
    /// directory and `options.dest.key` the destination prefix
    pub async fn upload_directory(&self, options: UploadOptions) -> Result<Vec<S3File>> {
        directory::upload_directory(&self.context(), &options).await
    }

    /// Download one object to a local file
    pub async fn download(&self, options: DownloadOptions) -> Result<S3File> {
        download::download(&self.context(), &options).await
    }

    /// Download every object under a prefix into a local directory
    pub async fn download_directory(&self, options: DownloadOptions) -> Result<Vec<S3File>> {
        directory::download_directory(&self.context(), &options).await
    }

    /// Copy an object on the store, without moving payload through this host
    pub async fn copy(&self, options: CopyOptions) -> Result<S3File> {
        copy::copy(&self.context(), &options).await
    }

    /// List objects under a prefix
    pub async fn list(&self, options: ListOptions) -> Result<ListResult> {
        let ctx = self.context();
        let ctx = &ctx;
        let delimiter = if options.recursive { None } else { Some("/") };
        let options = &options;
        execute_with_retry(
            &ctx.retry,
            &ctx.cancel,
            &format!("listing s3://{}/{}", options.bucket, options.prefix),
            || async move {
                let _permit = acquire(&ctx.http_permits).await?;
                ctx.adapter
                    .list_objects(&options.bucket, &options.prefix, delimiter)
                    .await
            },
        )
        .await
    }

    /// List all buckets visible to the credentials
    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        let ctx = self.context();
        let ctx = &ctx;
        execute_with_retry(&ctx.retry, &ctx.cancel, "listing buckets", || async move {
            let _permit = acquire(&ctx.http_permits).await?;
            ctx.adapter.list_buckets().await
        })
        .await
    }

    /// Head an object; `None` when it does not exist
    pub async fn exists(&self, target: &ObjectRef) -> Result<Option<ObjectHead>> {
        let ctx = self.context();
        let ctx = &ctx;
        let result = execute_with_retry(
            &ctx.retry,
            &ctx.cancel,
            &format!("checking {}", target),
            || async move {
                let _permit = acquire(&ctx.http_permits).await?;
                ctx.adapter.head_object(target).await
            },
        )
        .await;

        match result {
            Ok(head) => Ok(Some(head)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete an object
    pub async fn delete(&self, target: &ObjectRef) -> Result<S3File> {
        if self.exists(target).await?.is_none() {
            return Err(StoreError::Usage(format!("object not found: {}", target)));
        }

        let ctx = self.context();
        let ctx = &ctx;
        execute_with_retry(
            &ctx.retry,
            &ctx.cancel,
            &format!("deleting {}", target),
            || async move {
                let _permit = acquire(&ctx.http_permits).await?;
                ctx.adapter.delete(target).await
            },
        )
        .await?;

        Ok(S3File {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            etag: None,
            local_file: None,
            size: None,
        })
    }

    /// List in-progress multipart sessions under a prefix
    pub async fn list_pending_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<PendingUpload>> {
        if bucket.is_empty() {
            return Err(StoreError::Usage("missing bucket".to_string()));
        }
        let ctx = self.context();
        let ctx = &ctx;
        execute_with_retry(
            &ctx.retry,
            &ctx.cancel,
            &format!("listing pending uploads in s3://{}/{}", bucket, prefix),
            || async move {
                let _permit = acquire(&ctx.http_permits).await?;
                ctx.adapter.list_multipart_uploads(bucket, prefix).await
            },
        )
        .await
    }

    /// Abort one in-progress multipart session
    pub async fn abort_pending_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        if bucket.is_empty() || key.is_empty() || upload_id.is_empty() {
            return Err(StoreError::Usage(
                "abort requires a bucket, key and upload ID".to_string(),
            ));
        }
        let target = ObjectRef::new(bucket, key);
        let target = &target;
        let ctx = self.context();
        let ctx = &ctx;
        execute_with_retry(
            &ctx.retry,
            &ctx.cancel,
            &format!("aborting pending upload {} of {}", upload_id, target),
            || async move {
                let _permit = acquire(&ctx.http_permits).await?;
                ctx.adapter.abort_multipart(target, upload_id).await
            },
        )
        .await
    }

    /// Add a wrapping of an encrypted object's symmetric key under another
    /// key pair.
    ///
    /// Requires some existing private key (to recover the symmetric key) and
    /// the new key pair's public half. Afterwards either private key can
    /// download the object.
    pub async fn add_encrypted_key(&self, target: &ObjectRef, key_name: &str) -> Result<S3File> {
        let new_public = self.keys.public_key(key_name)?;

        let (head, mut annotations) = self.read_annotations(target).await?;
        let (recovered_from, sym_key) = recover_symmetric_key(self.keys.as_ref(), &annotations)?;
        debug!(
            "adding wrapping '{}' to {} (recovered via '{}')",
            key_name, target, recovered_from
        );

        let wrapped = wrap_symmetric_key(&new_public, &sym_key)?;
        annotations.add_wrapping(key_name.to_string(), wrapped)?;

        self.rewrite_annotations(target, head, &annotations).await
    }

    /// Remove the wrapping stored under a key pair name. The last wrapping
    /// cannot be removed.
    pub async fn remove_encrypted_key(&self, target: &ObjectRef, key_name: &str) -> Result<S3File> {
        let (head, mut annotations) = self.read_annotations(target).await?;
        annotations.remove_wrapping(key_name)?;
        debug!("removing wrapping '{}' from {}", key_name, target);

        self.rewrite_annotations(target, head, &annotations).await
    }

    async fn read_annotations(&self, target: &ObjectRef) -> Result<(ObjectHead, ObjectAnnotations)> {
        let ctx = self.context();
        let ctx = &ctx;
        let head = execute_with_retry(
            &ctx.retry,
            &ctx.cancel,
            &format!("reading metadata of {}", target),
            || async move {
                let _permit = acquire(&ctx.http_permits).await?;
                ctx.adapter.head_object(target).await
            },
        )
        .await?;

        let annotations = ObjectAnnotations::from_map(&head.metadata)?.ok_or_else(|| {
            StoreError::Usage(format!("{} was not written by this tool", target))
        })?;
        annotations.validate_version(&target.to_string())?;
        if !annotations.is_encrypted() {
            return Err(StoreError::Usage(format!("{} is not encrypted", target)));
        }
        Ok((head, annotations))
    }

    async fn rewrite_annotations(
        &self,
        target: &ObjectRef,
        head: ObjectHead,
        annotations: &ObjectAnnotations,
    ) -> Result<S3File> {
        let mut metadata = head.metadata;
        annotations.apply_to(&mut metadata);
        let metadata = &metadata;

        let ctx = self.context();
        let ctx = &ctx;
        let etag = execute_with_retry(
            &ctx.retry,
            &ctx.cancel,
            &format!("rewriting metadata of {}", target),
            || async move {
                let _permit = acquire(&ctx.http_permits).await?;
                ctx.adapter
                    .copy_object_replace_metadata(target, metadata)
                    .await
            },
        )
        .await?;

        Ok(S3File {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            etag,
            local_file: None,
            size: Some(annotations.file_length),
        })
    }

    /// Cancel every operation running on this client. In-flight store calls
    /// run to completion and their results are discarded; multipart sessions
    /// are aborted by their orchestrators.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Shut the client down: cancel outstanding work and close both pools.
    /// Each step runs regardless of the others.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.http_permits.close();
        self.internal_permits.close();
    }
}

async fn acquire(permits: &Semaphore) -> Result<tokio::sync::SemaphorePermit<'_>> {
    permits.acquire().await.map_err(|_| StoreError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfigBuilder;

    async fn test_client() -> StoreClient {
        let config = ClientConfigBuilder::new()
            .region("us-east-1")
            .endpoint("http://localhost:9000")
            .credentials("test", "test")
            .build()
            .unwrap();
        StoreClient::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_client_construction() {
        let client = test_client().await;
        assert_eq!(client.config().http_concurrency, 10);
        assert_eq!(client.config().internal_concurrency, 50);
    }

    #[tokio::test]
    async fn test_upload_rejects_directory() {
        let client = test_client().await;
        let dir = tempfile::TempDir::new().unwrap();
        let options = crate::options::UploadOptionsBuilder::new(
            dir.path(),
            ObjectRef::new("bucket", "key"),
            client.config().chunk_size,
        )
        .build()
        .unwrap();

        let err = client.upload(options).await.unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
    }

    #[tokio::test]
    async fn test_abort_pending_upload_validates_arguments() {
        let client = test_client().await;
        assert!(client.abort_pending_upload("", "k", "id").await.is_err());
        assert!(client.abort_pending_upload("b", "", "id").await.is_err());
        assert!(client.abort_pending_upload("b", "k", "").await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_new_work() {
        let client = test_client().await;
        client.shutdown();

        // pools are closed; any operation that needs a permit fails as
        // cancelled instead of hanging
        let err = client.list_buckets().await.unwrap_err();
        assert!(matches!(err.root_cause(), StoreError::Cancelled));
    }
}
