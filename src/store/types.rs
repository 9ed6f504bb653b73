//! Type definitions for store operations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::StoreError;

/// Identity of an object on the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Bucket name
    pub bucket: String,

    /// Object key (path within bucket)
    pub key: String,

    /// Version ID, if addressing a specific version
    pub version: Option<String>,
}

impl ObjectRef {
    /// Create a reference to the latest version of an object
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version: None,
        }
    }

    /// The `s3://` URI form of this reference
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)?;
        if let Some(v) = &self.version {
            write!(f, "?versionId={}", v)?;
        }
        Ok(())
    }
}

/// Result record of a completed transfer operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3File {
    /// Bucket name
    pub bucket: String,

    /// Object key
    pub key: String,

    /// ETag of the finished object, when the operation produced one
    pub etag: Option<String>,

    /// Local file involved in the transfer; `None` for store-to-store copies
    pub local_file: Option<PathBuf>,

    /// Plaintext size in bytes, when known
    pub size: Option<u64>,
}

/// Head-object response: size, ETag and the full user metadata map
#[derive(Debug, Clone)]
pub struct ObjectHead {
    /// Object size in bytes as stored (ciphertext size for encrypted objects)
    pub size: u64,

    /// ETag
    pub etag: Option<String>,

    /// User-defined metadata
    pub metadata: HashMap<String, String>,

    /// Version ID, if versioning is enabled on the bucket
    pub version_id: Option<String>,

    /// Last modified timestamp
    pub last_modified: Option<SystemTime>,
}

/// One object in a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedObject {
    /// Object key
    pub key: String,

    /// Stored size in bytes
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: Option<SystemTime>,

    /// ETag
    pub etag: Option<String>,
}

/// Result of listing objects under a prefix
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Objects under the prefix
    pub objects: Vec<ListedObject>,

    /// Common prefixes (directories), populated when a delimiter was used
    pub common_prefixes: Vec<String>,
}

/// An in-progress multipart upload session on the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Object key the session would produce
    pub key: String,

    /// Upload ID identifying the session
    pub upload_id: String,

    /// When the session was initiated
    pub initiated: Option<SystemTime>,
}

/// A completed part of a multipart session
#[derive(Debug, Clone)]
pub struct CompletedPartInfo {
    /// 1-based part number
    pub part_number: i32,

    /// ETag the store returned for the part
    pub etag: String,
}

/// Grants on an object, in vendor-free form
#[derive(Debug, Clone, Default)]
pub struct ObjectAclSummary {
    /// Owner display name or ID
    pub owner: Option<String>,

    /// (grantee, permission) pairs
    pub grants: Vec<(String, String)>,
}

/// Canned access control lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CannedAcl {
    /// Owner-only access
    Private,

    /// Anyone may read
    PublicRead,

    /// Anyone may read or write
    PublicReadWrite,

    /// Any authenticated AWS user may read
    AuthenticatedRead,

    /// Bucket owner may read
    BucketOwnerRead,

    /// Bucket owner has full control
    #[default]
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// All canned ACLs in their string form
    pub const ALL: [&'static str; 6] = [
        "private",
        "public-read",
        "public-read-write",
        "authenticated-read",
        "bucket-owner-read",
        "bucket-owner-full-control",
    ];
}

impl std::str::FromStr for CannedAcl {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(CannedAcl::Private),
            "public-read" => Ok(CannedAcl::PublicRead),
            "public-read-write" => Ok(CannedAcl::PublicReadWrite),
            "authenticated-read" => Ok(CannedAcl::AuthenticatedRead),
            "bucket-owner-read" => Ok(CannedAcl::BucketOwnerRead),
            "bucket-owner-full-control" => Ok(CannedAcl::BucketOwnerFullControl),
            other => Err(StoreError::Usage(format!(
                "invalid canned ACL '{}', choose one of: {}",
                other,
                CannedAcl::ALL.join(", ")
            ))),
        }
    }
}

impl std::fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
            CannedAcl::AuthenticatedRead => "authenticated-read",
            CannedAcl::BucketOwnerRead => "bucket-owner-read",
            CannedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
        };
        write!(f, "{}", s)
    }
}

/// Storage classes for uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StorageClass {
    /// Standard storage class
    #[default]
    Standard,

    /// Infrequent access
    StandardIa,

    /// One zone infrequent access
    OnezoneIa,

    /// Intelligent tiering
    IntelligentTiering,

    /// Reduced redundancy
    ReducedRedundancy,
}

impl std::str::FromStr for StorageClass {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(StorageClass::Standard),
            "STANDARD_IA" => Ok(StorageClass::StandardIa),
            "ONEZONE_IA" => Ok(StorageClass::OnezoneIa),
            "INTELLIGENT_TIERING" => Ok(StorageClass::IntelligentTiering),
            "REDUCED_REDUNDANCY" => Ok(StorageClass::ReducedRedundancy),
            other => Err(StoreError::Usage(format!(
                "invalid storage class '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_object_ref_display() {
        let r = ObjectRef::new("bucket", "dir/file.bin");
        assert_eq!(r.to_string(), "s3://bucket/dir/file.bin");

        let mut r = ObjectRef::new("bucket", "file");
        r.version = Some("v1".to_string());
        assert_eq!(r.to_string(), "s3://bucket/file?versionId=v1");
    }

    #[test]
    fn test_canned_acl_round_trip() {
        for name in CannedAcl::ALL {
            let acl = CannedAcl::from_str(name).unwrap();
            assert_eq!(acl.to_string(), name);
        }
    }

    #[test]
    fn test_canned_acl_rejects_unknown() {
        let err = CannedAcl::from_str("everyone").unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
    }

    #[test]
    fn test_default_acl() {
        assert_eq!(CannedAcl::default(), CannedAcl::BucketOwnerFullControl);
    }

    #[test]
    fn test_storage_class_parse() {
        assert_eq!(
            StorageClass::from_str("STANDARD_IA").unwrap(),
            StorageClass::StandardIa
        );
        assert!(StorageClass::from_str("GLACIER_X").is_err());
    }
}
