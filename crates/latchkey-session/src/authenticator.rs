//! The authenticator contract.
//!
//! Latchkey doesn't implement any authentication protocol itself. Posting
//! credentials for a token, running an OAuth dance, checking a device
//! certificate: that's the authenticator's job. Latchkey defines the
//! [`Authenticator`] trait and calls it at the right moments.
//!
//! # Fail-closed defaults
//!
//! Every method has a default, and the defaults are chosen so that an
//! authenticator that forgets to implement something can never grant a
//! session by accident:
//!
//! | method         | default                                   |
//! |----------------|-------------------------------------------|
//! | `restore`      | fails (`Unsupported`)                     |
//! | `authenticate` | fails (`Unsupported`)                     |
//! | `invalidate`   | succeeds, does nothing                    |
//!
//! # Why `async_trait`?
//!
//! The session has to hold "whichever authenticator the persisted record
//! names", which means `Arc<dyn Authenticator>`. Native `async fn` in
//! traits isn't object-safe yet; `#[async_trait]` boxes the futures so
//! the trait can be used behind `dyn`.

use std::sync::Arc;

use async_trait::async_trait;
use latchkey_protocol::{AuthenticatorId, Properties};

use crate::{AuthenticatorError, SessionEvents};

/// A shared, type-erased authenticator.
pub type AuthenticatorRef = Arc<dyn Authenticator>;

/// Performs the credential exchange that makes up a session.
///
/// # Trait bounds
///
/// - `Send + Sync` → the session task may run on any Tokio worker thread.
/// - `'static` → authenticators are registered once and live as long as
///   the application.
///
/// # Example
///
/// ```rust
/// use latchkey_protocol::Properties;
/// use latchkey_session::{async_trait, Authenticator, AuthenticatorError};
///
/// /// Accepts any non-empty `token` option as-is.
/// /// Only for development, never use this in production!
/// struct DevAuthenticator;
///
/// #[async_trait]
/// impl Authenticator for DevAuthenticator {
///     async fn restore(&self, properties: Properties) -> Result<Properties, AuthenticatorError> {
///         Ok(properties)
///     }
///
///     async fn authenticate(&self, options: Properties) -> Result<Properties, AuthenticatorError> {
///         match options.get("token").and_then(|t| t.as_str()) {
///             Some(token) if !token.is_empty() => Ok(options),
///             _ => Err(AuthenticatorError::rejected("missing token")),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// The name persisted next to the session content and handed to the
    /// resolver on restore.
    ///
    /// Defaults to the implementing type's path. Override it if the type
    /// may be renamed or moved while persisted sessions still exist.
    fn id(&self) -> AuthenticatorId {
        AuthenticatorId::new(std::any::type_name::<Self>())
    }

    /// Re-establishes a session from persisted properties, without user
    /// interaction.
    ///
    /// Called on startup and whenever the store reports an external
    /// change. `properties` never contains the reserved `authenticator`
    /// key. `Ok` with the properties to keep (usually `properties` itself,
    /// possibly refreshed) authenticates the session; `Err` clears it.
    async fn restore(&self, _properties: Properties) -> Result<Properties, AuthenticatorError> {
        Err(AuthenticatorError::Unsupported("restore"))
    }

    /// Performs the exchange with caller-supplied options (credentials,
    /// provider tokens, ...).
    ///
    /// `Ok` with the properties that become the session content; `Err` is
    /// handed back to whoever called `Session::authenticate`.
    async fn authenticate(&self, _options: Properties) -> Result<Properties, AuthenticatorError> {
        Err(AuthenticatorError::Unsupported("authenticate"))
    }

    /// Tears the session down on the other side (e.g. revokes a token).
    ///
    /// `Err` cancels the invalidation: the session stays authenticated.
    async fn invalidate(&self, _content: &Properties) -> Result<(), AuthenticatorError> {
        Ok(())
    }

    /// The emitter this authenticator pushes refreshed properties through.
    ///
    /// `None` (the default) means it never does.
    fn session_events(&self) -> Option<&SessionEvents> {
        None
    }
}

/// Returns `true` if both references point at the same authenticator
/// instance.
///
/// Compares data addresses only; comparing the fat pointers would also
/// compare vtables, which may be duplicated across codegen units.
pub fn same_authenticator(a: &AuthenticatorRef, b: &AuthenticatorRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
