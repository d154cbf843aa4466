//! Unified error type for Latchkey.

use latchkey_protocol::ProtocolError;
use latchkey_session::{AuthenticatorError, SessionError};
use latchkey_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `latchkey` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LatchkeyError {
    /// Encoding or decoding a persisted record failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A store failed to read, write, or remove the record.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session operation failed (authentication rejected, nothing to
    /// invalidate, session stopped).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An authenticator failed outside of a session.
    #[error(transparent)]
    Authenticator(#[from] AuthenticatorError),
}
