//! Sync error types and result alias.

use thiserror::Error;

/// Sync result type alias
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by a sync invocation.
///
/// Nothing is retried internally; every failure is returned to the caller
/// as-is. `RemoteNotFound` is kept separate from `RemoteUnavailable` because
/// callers treat a missing artifact differently from a registry they could
/// not reach.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport-level failure (connect, timeout, mid-stream abort, or a
    /// non-success status other than 404). Potentially transient.
    #[error("Registry unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Artifact not found: {0}")]
    RemoteNotFound(String),

    #[error("Local IO error: {0}")]
    LocalIo(#[from] std::io::Error),

    /// The downloaded file does not hash to the digest the registry reported.
    /// Fatal; never downgraded to a skip.
    #[error("Checksum mismatch: expected sha256 {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error means the artifact does not exist remotely.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RemoteNotFound(_))
    }
}
