//! Store access: vendor-free value types and the SDK adapter

pub mod adapter;
pub mod types;

pub use adapter::StoreAdapter;
pub use types::{
    CannedAcl, CompletedPartInfo, ListResult, ListedObject, ObjectAclSummary, ObjectHead,
    ObjectRef, PendingUpload, S3File, StorageClass,
};
