//! Directory-level fan-out
//!
//! Directory operations discover their file set up front, then run one
//! ordinary transfer per file concurrently over the same pools. A failure in
//! any file fails the whole operation once every in-flight transfer has
//! settled.

use std::io;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, StoreError};
use crate::options::{DownloadOptions, UploadOptions};
use crate::retry::execute_with_retry;
use crate::store::types::{ObjectRef, S3File};

use super::{download::download, upload::upload, TransferContext};

/// Upload every file under a local directory.
///
/// `options.file` names the directory and `options.dest.key` the destination
/// prefix; each discovered file keeps its path relative to the directory.
pub async fn upload_directory(
    ctx: &TransferContext,
    options: &UploadOptions,
) -> Result<Vec<S3File>> {
    let files = collect_files(&options.file)?;
    debug!(
        "uploading {} file(s) from '{}' to {}",
        files.len(),
        options.file.display(),
        options.dest
    );

    let handles: Vec<_> = files
        .into_iter()
        .map(|relative| {
            let ctx = ctx.clone();
            let mut file_options = options.clone();
            file_options.file = options.file.join(&relative);
            file_options.dest = ObjectRef {
                bucket: options.dest.bucket.clone(),
                key: join_key(&options.dest.key, &relative),
                version: None,
            };
            tokio::spawn(async move { upload(&ctx, &file_options).await })
        })
        .collect();

    collect_results(handles).await
}

/// Download every object under a prefix into a local directory.
///
/// `options.source.key` names the prefix and `options.file` the local
/// directory; object keys below the prefix become relative paths.
pub async fn download_directory(
    ctx: &TransferContext,
    options: &DownloadOptions,
) -> Result<Vec<S3File>> {
    let prefix = normalize_prefix(&options.source.key);

    let prefix_ref = prefix.as_str();
    let listed = execute_with_retry(
        &ctx.retry,
        &ctx.cancel,
        &format!("listing s3://{}/{}", options.source.bucket, prefix),
        || async move {
            let _permit = ctx
                .http_permits
                .acquire()
                .await
                .map_err(|_| StoreError::Cancelled)?;
            ctx.adapter
                .list_objects(&options.source.bucket, prefix_ref, None)
                .await
        },
    )
    .await?;
    debug!(
        "downloading {} object(s) from {} to '{}'",
        listed.objects.len(),
        options.source,
        options.file.display()
    );

    let handles: Vec<_> = listed
        .objects
        .into_iter()
        // keys ending in '/' are directory markers, not objects
        .filter(|obj| !obj.key.ends_with('/'))
        .map(|obj| {
            let ctx = ctx.clone();
            let relative = obj
                .key
                .strip_prefix(&prefix)
                .unwrap_or(&obj.key)
                .to_string();
            let mut file_options = options.clone();
            file_options.source = ObjectRef::new(options.source.bucket.clone(), obj.key);
            file_options.file = options.file.join(&relative);
            tokio::spawn(async move { download(&ctx, &file_options).await })
        })
        .collect();

    collect_results(handles).await
}

async fn collect_results(
    handles: Vec<tokio::task::JoinHandle<Result<S3File>>>,
) -> Result<Vec<S3File>> {
    let mut files = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for result in join_all(handles).await {
        match result {
            Ok(Ok(file)) => files.push(file),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                first_error.get_or_insert(StoreError::Io(io::Error::other(format!(
                    "transfer task failed: {}",
                    join_err
                ))));
            }
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(files),
    }
}

/// Enumerate regular files under a directory as relative paths
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(StoreError::Usage(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            StoreError::Io(io::Error::other(format!(
                "walking '{}': {}",
                dir.display(),
                e
            )))
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(relative);
        }
    }
    files.sort();
    Ok(files)
}

/// Destination key for one discovered file
fn join_key(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        relative
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Prefix form of a source key: empty stays empty, otherwise '/'-terminated
fn normalize_prefix(key: &str) -> String {
    if key.is_empty() || key.ends_with('/') {
        key.to_string()
    } else {
        format!("{}/", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_files_recurses_and_relativizes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a/mid.txt"), b"2").unwrap();
        std::fs::write(dir.path().join("a/b/leaf.txt"), b"3").unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("a/b/leaf.txt"),
                PathBuf::from("a/mid.txt"),
                PathBuf::from("top.txt"),
            ]
        );
    }

    #[test]
    fn test_collect_files_rejects_non_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            collect_files(&file).unwrap_err(),
            StoreError::Usage(_)
        ));
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("backups", Path::new("a/b.txt")), "backups/a/b.txt");
        assert_eq!(join_key("backups/", Path::new("a.txt")), "backups/a.txt");
        assert_eq!(join_key("", Path::new("a.txt")), "a.txt");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("dir"), "dir/");
        assert_eq!(normalize_prefix("dir/"), "dir/");
        assert_eq!(normalize_prefix(""), "");
    }
}
