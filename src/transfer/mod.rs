//! Transfer orchestration
//!
//! Upload, download and copy share the same three-phase skeleton: initiate
//! (retried as a unit), parts-in-flight (every part submitted concurrently,
//! each independently retried), complete (retried as a unit). A failed part
//! aborts the multipart session before the error propagates, so a transfer
//! leaves either a complete object or none.

pub mod copy;
pub mod directory;
pub mod download;
pub mod upload;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::crypto::KeyProvider;
use crate::progress::ProgressListenerFactory;
use crate::retry::RetryConfig;
use crate::store::types::ObjectRef;
use crate::store::StoreAdapter;

/// Capabilities an orchestrator needs, passed explicitly to each operation.
///
/// The two semaphores are the client's pools: `http_permits` bounds calls
/// into the store, `internal_permits` bounds local work (file I/O, crypto).
/// Retry backoff sleeps hold neither, so a saturated HTTP pool never starves
/// retry scheduling.
#[derive(Clone)]
pub struct TransferContext {
    /// Store adapter shared by all operations of one client
    pub adapter: Arc<StoreAdapter>,

    /// Key provider for envelope encryption
    pub keys: Arc<dyn KeyProvider>,

    /// Retry configuration applied at every retryable call site
    pub retry: RetryConfig,

    /// Bound on concurrent store HTTP calls
    pub http_permits: Arc<Semaphore>,

    /// Bound on concurrent internal tasks
    pub internal_permits: Arc<Semaphore>,

    /// Cancellation signal for this operation
    pub cancel: CancellationToken,

    /// Optional progress reporting hook
    pub progress: Option<Arc<dyn ProgressListenerFactory>>,

    /// Chunk size used when an operation has no better source for one
    pub default_chunk_size: u64,
}

/// Best-effort abort of a multipart session after a failure. The original
/// error is what the caller needs to see; an abort failure only gets logged.
pub(crate) async fn abort_session(ctx: &TransferContext, dest: &ObjectRef, upload_id: &str) {
    if let Err(abort_err) = ctx.adapter.abort_multipart(dest, upload_id).await {
        warn!(
            "failed to abort multipart session {} for {}: {}",
            upload_id, dest, abort_err
        );
    }
}
