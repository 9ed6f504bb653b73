//! Per-operation option records
//!
//! Each operation takes one validated options value. The builders validate
//! required fields up front and fail fast with a usage error, so orchestrators
//! never see half-formed input.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::chunk::AES_BLOCK_SIZE;
use crate::error::{Result, StoreError};
use crate::store::types::{CannedAcl, ObjectRef, StorageClass};

/// Options for an upload
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Local file (or directory, for directory uploads)
    pub file: PathBuf,

    /// Destination object
    pub dest: ObjectRef,

    /// Plaintext chunk size in bytes
    pub chunk_size: u64,

    /// Name of the key pair to encrypt under; `None` uploads plaintext
    pub enc_key_name: Option<String>,

    /// Canned ACL stamped on the object
    pub acl: CannedAcl,

    /// Storage class, when not the bucket default
    pub storage_class: Option<StorageClass>,
}

/// Builder for [`UploadOptions`]
pub struct UploadOptionsBuilder {
    file: PathBuf,
    dest: ObjectRef,
    chunk_size: u64,
    enc_key_name: Option<String>,
    acl: CannedAcl,
    storage_class: Option<StorageClass>,
}

impl UploadOptionsBuilder {
    /// Start building upload options for a file and destination
    pub fn new(file: impl Into<PathBuf>, dest: ObjectRef, chunk_size: u64) -> Self {
        Self {
            file: file.into(),
            dest,
            chunk_size,
            enc_key_name: None,
            acl: CannedAcl::default(),
            storage_class: None,
        }
    }

    /// Encrypt under the named key pair
    pub fn enc_key(mut self, name: impl Into<String>) -> Self {
        self.enc_key_name = Some(name.into());
        self
    }

    /// Set the canned ACL
    pub fn acl(mut self, acl: CannedAcl) -> Self {
        self.acl = acl;
        self
    }

    /// Set the storage class
    pub fn storage_class(mut self, sc: StorageClass) -> Self {
        self.storage_class = Some(sc);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<UploadOptions> {
        validate_ref(&self.dest)?;
        if self.dest.key.is_empty() {
            return Err(StoreError::Usage(format!(
                "destination '{}' does not name an object or prefix",
                self.dest
            )));
        }
        validate_chunk_size(self.chunk_size, self.enc_key_name.is_some())?;
        if let Some(name) = &self.enc_key_name {
            if name.is_empty() {
                return Err(StoreError::Usage("encryption key name is empty".to_string()));
            }
        }
        Ok(UploadOptions {
            file: self.file,
            dest: self.dest,
            chunk_size: self.chunk_size,
            enc_key_name: self.enc_key_name,
            acl: self.acl,
            storage_class: self.storage_class,
        })
    }
}

/// Options for a download
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Source object
    pub source: ObjectRef,

    /// Local destination file (or directory, for directory downloads)
    pub file: PathBuf,

    /// Replace an existing local file instead of failing
    pub overwrite: bool,

    /// Chunk size for objects this tool did not write; objects written by
    /// this tool carry their own chunk size in metadata
    pub chunk_size: Option<u64>,
}

/// Builder for [`DownloadOptions`]
pub struct DownloadOptionsBuilder {
    source: ObjectRef,
    file: PathBuf,
    overwrite: bool,
    chunk_size: Option<u64>,
}

impl DownloadOptionsBuilder {
    /// Start building download options for a source and local path
    pub fn new(source: ObjectRef, file: impl Into<PathBuf>) -> Self {
        Self {
            source,
            file: file.into(),
            overwrite: false,
            chunk_size: None,
        }
    }

    /// Replace an existing local file
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Chunk size used for objects without transfer metadata
    pub fn chunk_size(mut self, size: u64) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<DownloadOptions> {
        validate_ref(&self.source)?;
        if self.source.key.is_empty() {
            return Err(StoreError::Usage(format!(
                "source '{}' does not name an object",
                self.source
            )));
        }
        if let Some(size) = self.chunk_size {
            validate_chunk_size(size, false)?;
        }
        Ok(DownloadOptions {
            source: self.source,
            file: self.file,
            overwrite: self.overwrite,
            chunk_size: self.chunk_size,
        })
    }
}

/// Options for a store-to-store copy
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Source object
    pub source: ObjectRef,

    /// Destination object
    pub dest: ObjectRef,

    /// Canned ACL stamped on the destination
    pub acl: CannedAcl,

    /// Replacement user metadata; `None` carries the source metadata over
    pub user_metadata: Option<HashMap<String, String>>,
}

/// Builder for [`CopyOptions`]
pub struct CopyOptionsBuilder {
    source: ObjectRef,
    dest: ObjectRef,
    acl: CannedAcl,
    user_metadata: Option<HashMap<String, String>>,
}

impl CopyOptionsBuilder {
    /// Start building copy options
    pub fn new(source: ObjectRef, dest: ObjectRef) -> Self {
        Self {
            source,
            dest,
            acl: CannedAcl::default(),
            user_metadata: None,
        }
    }

    /// Set the canned ACL for the destination
    pub fn acl(mut self, acl: CannedAcl) -> Self {
        self.acl = acl;
        self
    }

    /// Replace the destination's user metadata
    pub fn user_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.user_metadata = Some(metadata);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<CopyOptions> {
        validate_ref(&self.source)?;
        validate_ref(&self.dest)?;
        if self.source.key.is_empty() || self.dest.key.is_empty() {
            return Err(StoreError::Usage(
                "copy requires both a source and a destination object key".to_string(),
            ));
        }
        if self.dest.version.is_some() {
            return Err(StoreError::Usage(
                "copy destination must not carry a version ID".to_string(),
            ));
        }
        Ok(CopyOptions {
            source: self.source,
            dest: self.dest,
            acl: self.acl,
            user_metadata: self.user_metadata,
        })
    }
}

/// Options for listing objects
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Bucket to list
    pub bucket: String,

    /// Key prefix; empty lists the whole bucket
    pub prefix: String,

    /// Descend past `/` boundaries instead of grouping them as prefixes
    pub recursive: bool,
}

impl ListOptions {
    /// List under a prefix
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(StoreError::Usage("missing bucket".to_string()));
        }
        Ok(Self {
            bucket,
            prefix: prefix.into(),
            recursive: false,
        })
    }

    /// Descend recursively
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

fn validate_ref(target: &ObjectRef) -> Result<()> {
    if target.bucket.is_empty() {
        return Err(StoreError::Usage("missing bucket".to_string()));
    }
    Ok(())
}

fn validate_chunk_size(chunk_size: u64, encrypted: bool) -> Result<()> {
    if chunk_size == 0 {
        return Err(StoreError::Usage("chunk size must be positive".to_string()));
    }
    if encrypted && chunk_size % AES_BLOCK_SIZE != 0 {
        return Err(StoreError::Usage(format!(
            "encrypted uploads need a chunk size that is a multiple of {} bytes, got {}",
            AES_BLOCK_SIZE, chunk_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> ObjectRef {
        ObjectRef::new("bucket", "dir/file.bin")
    }

    #[test]
    fn test_upload_options_defaults() {
        let opts = UploadOptionsBuilder::new("/tmp/f", dest(), 5 * 1024 * 1024)
            .build()
            .unwrap();
        assert_eq!(opts.acl, CannedAcl::BucketOwnerFullControl);
        assert!(opts.enc_key_name.is_none());
        assert!(opts.storage_class.is_none());
    }

    #[test]
    fn test_upload_rejects_misaligned_chunk_with_encryption() {
        // fine without encryption
        assert!(UploadOptionsBuilder::new("/tmp/f", dest(), 1000)
            .build()
            .is_ok());
        // rejected with encryption
        let err = UploadOptionsBuilder::new("/tmp/f", dest(), 1000)
            .enc_key("alice")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
    }

    #[test]
    fn test_upload_rejects_zero_chunk() {
        assert!(UploadOptionsBuilder::new("/tmp/f", dest(), 0).build().is_err());
    }

    #[test]
    fn test_upload_rejects_missing_bucket() {
        assert!(
            UploadOptionsBuilder::new("/tmp/f", ObjectRef::new("", "k"), 1024)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_download_options() {
        let opts = DownloadOptionsBuilder::new(dest(), "/tmp/out")
            .overwrite(true)
            .build()
            .unwrap();
        assert!(opts.overwrite);

        assert!(
            DownloadOptionsBuilder::new(ObjectRef::new("b", ""), "/tmp/out")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_copy_options() {
        let opts = CopyOptionsBuilder::new(dest(), ObjectRef::new("other", "copy.bin"))
            .acl(CannedAcl::Private)
            .build()
            .unwrap();
        assert_eq!(opts.acl, CannedAcl::Private);

        let mut versioned_dest = ObjectRef::new("other", "copy.bin");
        versioned_dest.version = Some("v1".to_string());
        assert!(CopyOptionsBuilder::new(dest(), versioned_dest).build().is_err());
    }

    #[test]
    fn test_list_options() {
        let opts = ListOptions::new("bucket", "prefix/").unwrap().recursive(true);
        assert!(opts.recursive);
        assert!(ListOptions::new("", "prefix/").is_err());
    }
}
