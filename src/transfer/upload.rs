//! Upload orchestration

use std::io;
use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::debug;

use crate::chunk::{plan_parts, PartPlan};
use crate::crypto::envelope::{generate_symmetric_key, wrap_symmetric_key, SYMMETRIC_KEY_LEN};
use crate::crypto::stream::encrypt_part;
use crate::error::{Result, StoreError};
use crate::metadata::ObjectAnnotations;
use crate::options::UploadOptions;
use crate::progress::{ProgressListener, ProgressOptions};
use crate::retry::execute_with_retry;
use crate::store::types::{CompletedPartInfo, ObjectRef, S3File};

use super::{abort_session, TransferContext};

/// Read buffer size for part I/O
const READ_BUF_SIZE: usize = 8192;

/// Upload one local file as a multipart object.
///
/// The file length is frozen when the operation is planned; modifying the
/// file while the upload runs is undefined behaviour.
pub async fn upload(ctx: &TransferContext, options: &UploadOptions) -> Result<S3File> {
    let uri = options.dest.to_string();

    let file_length = tokio::fs::metadata(&options.file)
        .await
        .map_err(|e| {
            StoreError::Usage(format!(
                "cannot upload '{}': {}",
                options.file.display(),
                e
            ))
        })?
        .len();

    // Wrap a fresh symmetric key before anything touches the store, so a
    // missing key pair fails the operation up front.
    let envelope = match &options.enc_key_name {
        Some(name) => {
            let public = ctx.keys.public_key(name)?;
            let sym_key = generate_symmetric_key();
            let wrapped = wrap_symmetric_key(&public, &sym_key)?;
            Some((name.clone(), wrapped, sym_key))
        }
        None => None,
    };

    let annotations = match &envelope {
        Some((name, wrapped, _)) => ObjectAnnotations::new_encrypted(
            options.chunk_size,
            file_length,
            name.clone(),
            wrapped.clone(),
        ),
        None => ObjectAnnotations::new_plain(options.chunk_size, file_length),
    };
    let metadata_map = annotations.to_map();
    let metadata = &metadata_map;

    // Phase 1: initiate the multipart session
    debug!("initiating upload of {}", uri);
    let upload_id = execute_with_retry(
        &ctx.retry,
        &ctx.cancel,
        &format!("starting upload of {}", uri),
        || async move {
            let _permit = ctx
                .http_permits
                .acquire()
                .await
                .map_err(|_| StoreError::Cancelled)?;
            ctx.adapter
                .initiate_multipart(&options.dest, metadata, options.acl, options.storage_class)
                .await
        },
    )
    .await?;

    // Phase 2: all parts in flight at once
    let parts = plan_parts(file_length, options.chunk_size, envelope.is_some());
    let progress = ctx.progress.as_ref().map(|f| {
        f.create(ProgressOptions {
            uri: uri.clone(),
            operation: "upload",
            total_bytes: file_length,
        })
    });

    let mut handles = Vec::with_capacity(parts.len());
    for part in parts {
        let ctx = ctx.clone();
        let file = options.file.clone();
        let dest = options.dest.clone();
        let upload_id = upload_id.clone();
        let sym_key = envelope.as_ref().map(|(_, _, k)| *k);
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            upload_part(&ctx, &file, part, sym_key.as_ref(), &dest, &upload_id, progress.as_deref())
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
        return Err(error.context(format!("error uploading {}", uri)));
    }
    completed.sort_by_key(|p| p.part_number);

    // Phase 3: complete the session
    debug!("finished all parts of {}, completing upload", uri);
    let completed_parts = &completed;
    let session_id = upload_id.as_str();
    let complete_result = execute_with_retry(
        &ctx.retry,
        &ctx.cancel,
        &format!("completing upload of {}", uri),
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
            return Err(error.context(format!("error uploading {}", uri)));
        }
    };

    Ok(S3File {
        bucket: options.dest.bucket.clone(),
        key: options.dest.key.clone(),
        etag: Some(etag),
        local_file: Some(options.file.clone()),
        size: Some(file_length),
    })
}

/// Upload one part, retried as a unit: the file is re-read and re-encrypted
/// on every attempt so a retry never replays a half-consumed stream.
async fn upload_part(
    ctx: &TransferContext,
    file: &Path,
    part: PartPlan,
    sym_key: Option<&[u8; SYMMETRIC_KEY_LEN]>,
    dest: &ObjectRef,
    upload_id: &str,
    progress: Option<&dyn ProgressListener>,
) -> Result<CompletedPartInfo> {
    let description = format!("uploading part {} of {}", part.part_number(), dest);

    let info = execute_with_retry(&ctx.retry, &ctx.cancel, &description, || async move {
        let _task_permit = ctx
            .internal_permits
            .acquire()
            .await
            .map_err(|_| StoreError::Cancelled)?;

        let body = read_part_body(file, &part, sym_key).await?;
        debug_assert_eq!(body.len() as u64, part.ciphertext_len);

        let _http_permit = ctx
            .http_permits
            .acquire()
            .await
            .map_err(|_| StoreError::Cancelled)?;
        ctx.adapter
            .upload_part(dest, upload_id, part.part_number(), body)
            .await
    })
    .await?;

    if let Some(progress) = progress {
        progress.transferred(part.plaintext_len);
    }
    Ok(info)
}

/// Read this part's plaintext range from the file and produce the bytes that
/// go on the wire (encrypted with an inline IV when a key is present).
async fn read_part_body(
    file: &Path,
    part: &PartPlan,
    sym_key: Option<&[u8; SYMMETRIC_KEY_LEN]>,
) -> Result<Bytes> {
    let mut handle = File::open(file).await?;
    handle
        .seek(io::SeekFrom::Start(part.plaintext_start))
        .await?;
    let mut reader = BufReader::with_capacity(READ_BUF_SIZE, handle);

    let mut plaintext = vec![0u8; part.plaintext_len as usize];
    reader.read_exact(&mut plaintext).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::UnexpectedEof(format!(
                "reading bytes {}..{} of '{}'",
                part.plaintext_start,
                part.plaintext_start + part.plaintext_len,
                file.display()
            ))
        } else {
            StoreError::Io(e)
        }
    })?;

    let body = match sym_key {
        Some(key) => encrypt_part(key, &plaintext),
        None => plaintext,
    };
    Ok(Bytes::from(body))
}
