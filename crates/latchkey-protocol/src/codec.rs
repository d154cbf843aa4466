//! Codec trait and implementations for turning records into bytes.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! In-memory stores never need one; stores backed by a file, a cookie or
//! any other byte-oriented medium do. They take something that implements
//! [`Codec`] and stay agnostic of the actual format.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → a store holding the codec can be shared with the
///   session task, which Tokio may run on any worker thread.
/// - `'static` → the codec owns everything it needs.
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the decoded value
/// doesn't borrow from the input buffer, so the buffer can be dropped
/// right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps persisted sessions human-readable: you can open the file a
/// `FileStore` wrote and see exactly which authenticator and properties
/// will be restored on the next start.
///
/// ## Example
///
/// ```rust
/// use latchkey_protocol::{Codec, JsonCodec, PersistedRecord, Properties};
///
/// let codec = JsonCodec;
///
/// let mut content = Properties::new();
/// content.insert("token".into(), "abc".into());
/// let record = PersistedRecord::new("app::TokenAuthenticator", content);
///
/// let bytes = codec.encode(&record.to_properties()).unwrap();
/// let decoded: Properties = codec.decode(&bytes).unwrap();
/// assert_eq!(PersistedRecord::from_properties(decoded), record);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
