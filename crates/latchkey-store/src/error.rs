//! Error types for the store layer.

use latchkey_protocol::ProtocolError;

/// Errors that can occur while persisting, restoring or clearing a record.
///
/// None of these are fatal to a session: the session logs them and keeps
/// its in-memory state, which is the source of truth while the process runs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the backing medium failed.
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Writing the backing medium failed.
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Removing the persisted record failed.
    #[error("remove failed: {0}")]
    Remove(#[source] std::io::Error),

    /// The record could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtocolError),

    /// The store can't be used right now (e.g. its lock was poisoned by a
    /// panicking writer).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
