//! Download orchestration

use std::io::{self, SeekFrom};
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::chunk::{plan_parts, PartPlan};
use crate::crypto::envelope::{recover_symmetric_key, SYMMETRIC_KEY_LEN};
use crate::crypto::stream::decrypt_part;
use crate::error::{Result, StoreError};
use crate::metadata::ObjectAnnotations;
use crate::options::DownloadOptions;
use crate::progress::{ProgressListener, ProgressOptions};
use crate::retry::execute_with_retry;
use crate::store::types::{ObjectRef, S3File};

use super::TransferContext;

/// Write buffer size for part I/O
const WRITE_BUF_SIZE: usize = 8192;

/// Download one object to a local file.
///
/// The destination is truncated and re-created when the operation starts;
/// after a failure its contents are undefined and must not be trusted.
pub async fn download(ctx: &TransferContext, options: &DownloadOptions) -> Result<S3File> {
    let uri = options.source.to_string();

    prepare_local_file(&options.file, options.overwrite).await?;

    // Phase 1: fetch metadata and derive the transfer geometry
    debug!("starting download of {}", uri);
    let head = execute_with_retry(
        &ctx.retry,
        &ctx.cancel,
        &format!("starting download of {}", uri),
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

    let (file_length, chunk_size, sym_key) = match ObjectAnnotations::from_map(&head.metadata)? {
        Some(annotations) => {
            annotations.validate_version(&uri)?;
            let sym_key = if annotations.is_encrypted() {
                let (key_name, key) = recover_symmetric_key(ctx.keys.as_ref(), &annotations)?;
                debug!("decrypting {} with key pair '{}'", uri, key_name);
                Some(key)
            } else {
                None
            };
            (annotations.file_length, annotations.chunk_size, sym_key)
        }
        None => {
            // Object written by something else: plain payload, geometry from
            // the stored length.
            let chunk_size = options
                .chunk_size
                .unwrap_or(ctx.default_chunk_size)
                .min(head.size.max(1));
            (head.size, chunk_size, None)
        }
    };

    // Phase 2: all parts in flight at once
    let parts = plan_parts(file_length, chunk_size, sym_key.is_some());
    let progress = ctx.progress.as_ref().map(|f| {
        f.create(ProgressOptions {
            uri: uri.clone(),
            operation: "download",
            total_bytes: file_length,
        })
    });

    let mut handles = Vec::with_capacity(parts.len());
    for part in parts {
        let ctx = ctx.clone();
        let source = options.source.clone();
        let file = options.file.clone();
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            download_part(&ctx, &source, &file, part, sym_key.as_ref(), progress.as_deref()).await
        }));
    }

    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
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
        return Err(error.context(format!("error downloading {}", uri)));
    }

    Ok(S3File {
        bucket: options.source.bucket.clone(),
        key: options.source.key.clone(),
        etag: head.etag,
        local_file: Some(options.file.clone()),
        size: Some(file_length),
    })
}

/// Truncate and re-create the destination file, creating parent directories
async fn prepare_local_file(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(StoreError::Usage(format!(
            "local file '{}' already exists (pass overwrite to replace it)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    File::create(path).await?;
    Ok(())
}

/// Download one part, retried as a unit: the range is re-fetched and
/// re-decrypted from scratch on every attempt.
async fn download_part(
    ctx: &TransferContext,
    source: &ObjectRef,
    file: &Path,
    part: PartPlan,
    sym_key: Option<&[u8; SYMMETRIC_KEY_LEN]>,
    progress: Option<&dyn ProgressListener>,
) -> Result<()> {
    let description = format!("downloading part {} of {}", part.part_number(), source);

    execute_with_retry(&ctx.retry, &ctx.cancel, &description, || async move {
        let _task_permit = ctx
            .internal_permits
            .acquire()
            .await
            .map_err(|_| StoreError::Cancelled)?;

        // An empty unencrypted part stores zero bytes; there is no range to
        // fetch and nothing to write.
        if part.ciphertext_len == 0 {
            return Ok(());
        }

        let data = {
            let _http_permit = ctx
                .http_permits
                .acquire()
                .await
                .map_err(|_| StoreError::Cancelled)?;
            ctx.adapter
                .get_range(
                    source,
                    part.ciphertext_start,
                    part.ciphertext_start + part.ciphertext_len - 1,
                )
                .await?
        };

        if data.len() as u64 != part.ciphertext_len {
            return Err(StoreError::UnexpectedEof(format!(
                "reading part {} of {} ({} of {} bytes received)",
                part.part_number(),
                source,
                data.len(),
                part.ciphertext_len
            )));
        }

        let plaintext = match sym_key {
            Some(key) => decrypt_part(key, &data)?,
            None => data.to_vec(),
        };
        if plaintext.len() as u64 != part.plaintext_len {
            return Err(StoreError::Crypto(format!(
                "part {} of {} decrypted to {} bytes, expected {}",
                part.part_number(),
                source,
                plaintext.len(),
                part.plaintext_len
            )));
        }

        write_part(file, part.plaintext_start, &plaintext).await
    })
    .await?;

    if let Some(progress) = progress {
        progress.transferred(part.plaintext_len);
    }
    Ok(())
}

/// Write this part's plaintext at its offset in the destination file
async fn write_part(file: &Path, offset: u64, plaintext: &[u8]) -> Result<()> {
    let mut handle = OpenOptions::new().write(true).open(file).await?;
    handle.seek(SeekFrom::Start(offset)).await?;
    for chunk in plaintext.chunks(WRITE_BUF_SIZE) {
        handle.write_all(chunk).await?;
    }
    handle.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_creates_parents_and_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/out.bin");

        prepare_local_file(&path, false).await.unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        std::fs::write(&path, b"stale contents").unwrap();
        prepare_local_file(&path, true).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_prepare_refuses_existing_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"precious").unwrap();

        let err = prepare_local_file(&path, false).await.unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"precious");
    }

    #[tokio::test]
    async fn test_write_part_places_bytes_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        File::create(&path).await.unwrap();

        // parts written out of order still land at their own offsets
        write_part(&path, 10, b"world").await.unwrap();
        write_part(&path, 0, b"hello ....").await.unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[..10], b"hello ....");
        assert_eq!(&written[10..], b"world");
    }

    #[tokio::test]
    async fn test_write_part_spans_buffer_boundaries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        File::create(&path).await.unwrap();

        let data: Vec<u8> = (0..WRITE_BUF_SIZE * 2 + 100).map(|i| (i % 251) as u8).collect();
        write_part(&path, 3, &data).await.unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[3..], &data[..]);
    }
}
