use thiserror::Error;

/// Errors surfaced by remote collaborators.
///
/// Every variant except [`RemoteError::QuotaExhausted`] is transient: the
/// caller may retry the operation (sends by user action, receipts passively
/// on the next snapshot).
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The remote store could not be reached or rejected the write.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The referenced document no longer exists.
    #[error("document not found")]
    NotFound,

    /// Daily quota of the text service is spent; not retryable until reset.
    #[error("resource exhausted: daily quota reached")]
    QuotaExhausted,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RemoteError>;
