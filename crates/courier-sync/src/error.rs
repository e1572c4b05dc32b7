use thiserror::Error;

use courier_remote::RemoteError;
use courier_shared::{ClientSendId, ValidationError};
use courier_store::StoreError;

/// Errors surfaced by the sync engine's public operations.
///
/// Remote failures are transient and retryable by user action; cache
/// failures are downgraded to cache-miss wherever possible and only
/// surface from explicitly cache-facing calls.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("local cache error: {0}")]
    Cache(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Retry was requested for a send that is not in the failed state
    /// (already retried, already confirmed, or unknown).
    #[error("no failed send {0} to retry")]
    NoFailedSend(ClientSendId),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
