/*!
 * s3tool - Chunked, parallel, optionally-encrypted multipart transfers for
 * S3-compatible object stores
 *
 * The HTTP calls themselves are delegated to the AWS SDK; this crate is the
 * orchestration on top:
 * - Splitting byte ranges into parts and driving them concurrently
 * - A three-phase multipart lifecycle (initiate, transfer parts, complete)
 *   shared by upload, download and copy
 * - Client-side envelope encryption compatible with a fixed on-object
 *   metadata format (per-object AES key, RSA-wrapped in metadata, per-part
 *   CBC streams with inline IVs)
 * - Retry with exponential backoff at every step that can fail transiently
 */

pub mod chunk;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod options;
pub mod progress;
pub mod retry;
pub mod store;
pub mod transfer;
pub mod uri;

// Re-export commonly used types for convenience
pub use client::StoreClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Result, StoreError};
pub use options::{
    CopyOptions, CopyOptionsBuilder, DownloadOptions, DownloadOptionsBuilder, ListOptions,
    UploadOptions, UploadOptionsBuilder,
};
pub use store::types::{CannedAcl, ListedObject, ObjectRef, PendingUpload, S3File};
pub use uri::parse_object_uri;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
