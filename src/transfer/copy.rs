//! Store-to-store copy orchestration
//!
//! Copies never touch the payload: encrypted bytes travel through the store
//! opaquely, addressed by the same ciphertext ranges the download path uses.
//! No key material is needed to copy an encrypted object.

use std::io;

use tracing::debug;

use crate::chunk::plan_parts;
use crate::error::{Result, StoreError};
use crate::metadata::ObjectAnnotations;
use crate::options::CopyOptions;
use crate::retry::execute_with_retry;
use crate::store::types::{CompletedPartInfo, S3File};

use super::{abort_session, TransferContext};

/// Copy one object to another location on the store.
pub async fn copy(ctx: &TransferContext, options: &CopyOptions) -> Result<S3File> {
    let operation = format!("copy of {} to {}", options.source, options.dest);

    // Phase 1: read the source metadata and open the destination session
    debug!("starting {}", operation);
    let head = execute_with_retry(
        &ctx.retry,
        &ctx.cancel,
        &format!("starting {}", operation),
        || async move {
            let _permit = ctx
                .http_permits
                .acquire()
                .await
                .map_err(|_| StoreError::Cancelled)?;
            ctx.adapter.head_object(&options.source).await
        },
    )
    .await?;

    let mut metadata = match &options.user_metadata {
        Some(replacement) => replacement.clone(),
        None => head.metadata.clone(),
    };

    // A source written by something else gets transfer metadata synthesised
    // from its stored length, making the destination readable as our own.
    let annotations = match ObjectAnnotations::from_map(&metadata)? {
        Some(annotations) => annotations,
        None => {
            let chunk_size = ctx.default_chunk_size.min(head.size.max(1));
            let annotations = ObjectAnnotations::new_plain(chunk_size, head.size);
            annotations.apply_to(&mut metadata);
            annotations
        }
    };
    annotations.validate_version(&options.source.to_string())?;

    let metadata_ref = &metadata;
    let upload_id = execute_with_retry(
        &ctx.retry,
        &ctx.cancel,
        &format!("initiating {}", operation),
        || async move {
            let _permit = ctx
                .http_permits
                .acquire()
                .await
                .map_err(|_| StoreError::Cancelled)?;
            ctx.adapter
                .initiate_multipart(&options.dest, metadata_ref, options.acl, None)
                .await
        },
    )
    .await?;

    // Phase 2: copy every part over its stored range
    let parts = plan_parts(
        annotations.file_length,
        annotations.chunk_size,
        annotations.is_encrypted(),
    );
    let zero_length = annotations.file_length == 0;

    let mut handles = Vec::with_capacity(parts.len());
    for part in parts {
        let ctx = ctx.clone();
        let source = options.source.clone();
        let dest = options.dest.clone();
        let upload_id = upload_id.clone();

        // Zero-length sources copy as one whole-object part with no range
        // bounds.
        let range = if zero_length {
            None
        } else {
            Some((
                part.ciphertext_start,
                part.ciphertext_start + part.ciphertext_len - 1,
            ))
        };

        handles.push(tokio::spawn(async move {
            let description = format!("copying part {} of {}", part.part_number(), source);
            let ctx = &ctx;
            let source = &source;
            let dest = &dest;
            let upload_id = upload_id.as_str();
            execute_with_retry(&ctx.retry, &ctx.cancel, &description, || async move {
                let _permit = ctx
                    .http_permits
                    .acquire()
                    .await
                    .map_err(|_| StoreError::Cancelled)?;
                ctx.adapter
                    .copy_part(source, dest, upload_id, part.part_number(), range)
                    .await
            })
            .await
        }));
    }

    let mut completed: Vec<CompletedPartInfo> = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(info)) => completed.push(info),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                first_error.get_or_insert(StoreError::Io(io::Error::other(format!(
                    "part task failed: {}",
                    join_err
                ))));
            }
        }
    }
    if let Some(error) = first_error {
        abort_session(ctx, &options.dest, &upload_id).await;
        return Err(error.context(format!("error in {}", operation)));
    }
    completed.sort_by_key(|p| p.part_number);

    // Phase 3: complete the session
    debug!("finished all parts, completing {}", operation);
    let completed_parts = &completed;
    let session_id = upload_id.as_str();
    let complete_result = execute_with_retry(
        &ctx.retry,
        &ctx.cancel,
        &format!("completing {}", operation),
        || async move {
            let _permit = ctx
                .http_permits
                .acquire()
                .await
                .map_err(|_| StoreError::Cancelled)?;
            ctx.adapter
                .complete_multipart(&options.dest, session_id, completed_parts)
                .await
        },
    )
    .await;

    let etag = match complete_result {
        Ok(etag) => etag,
        Err(error) => {
            abort_session(ctx, &options.dest, &upload_id).await;
            return Err(error.context(format!("error in {}", operation)));
        }
    };

    Ok(S3File {
        bucket: options.dest.bucket.clone(),
        key: options.dest.key.clone(),
        etag: Some(etag),
        local_file: None,
        size: None,
    })
}
