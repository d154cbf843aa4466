//! Error types for the protocol layer.
//!
//! Each crate in Latchkey defines its own error enum. When you see a
//! `ProtocolError`, the problem is in turning a record into bytes (or
//! back), not in storage or authentication.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a record into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a record).
    ///
    /// Common causes: a truncated file, a hand-edited record, or bytes
    /// written by a different codec.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
