//! Error types for the session layer.

use latchkey_protocol::AuthenticatorId;

/// The error an [`Authenticator`](crate::Authenticator) fails with.
///
/// Opaque to the session: it never inspects it, only carries it back to
/// whoever asked for the operation.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticatorError {
    /// The exchange ran and the other side said no (bad credentials,
    /// expired token, revoked grant).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The authenticator doesn't implement this operation. This is what
    /// the trait's default `restore` and `authenticate` return.
    #[error("{0} is not supported by this authenticator")]
    Unsupported(&'static str),

    /// Anything else (transport failure, malformed response, ...).
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl AuthenticatorError {
    /// Shorthand for [`AuthenticatorError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Wraps any error as [`AuthenticatorError::Other`].
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}

/// Errors that can occur during session management.
///
/// Only `authenticate` and `invalidate` ever hand one of these to a
/// caller. Failures on the automatic paths (restore on start, external
/// store changes, authenticator updates) end up in the logs and show up
/// as the session being unauthenticated.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The authenticator rejected `authenticate`. The session is now
    /// unauthenticated.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[source] AuthenticatorError),

    /// The authenticator rejected `restore`. The store has been cleared.
    #[error("session restore failed: {0}")]
    RestoreFailed(#[source] AuthenticatorError),

    /// The authenticator rejected `invalidate`. Invalidation is cancelled
    /// and the session stays authenticated, unchanged.
    #[error("invalidation rejected: {0}")]
    InvalidationRejected(#[source] AuthenticatorError),

    /// The persisted record names an authenticator the resolver doesn't
    /// know. Handled exactly like a failed restore.
    #[error("no authenticator registered as {0}")]
    UnresolvableAuthenticator(AuthenticatorId),

    /// The persisted record doesn't name an authenticator at all.
    #[error("persisted record names no authenticator")]
    NoPersistedSession,

    /// `invalidate` was called while no authenticator is bound.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// The session task has stopped (shut down, or its runtime is gone).
    #[error("session task is no longer running")]
    Unavailable,
}

impl SessionError {
    /// The authenticator's own error, for the variants that carry one.
    pub fn authenticator_error(&self) -> Option<&AuthenticatorError> {
        match self {
            Self::AuthenticationFailed(e) | Self::RestoreFailed(e) | Self::InvalidationRejected(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}
