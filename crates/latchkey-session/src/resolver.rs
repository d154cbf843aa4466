//! Turning a persisted authenticator name back into an authenticator.

use std::collections::HashMap;

use latchkey_protocol::AuthenticatorId;

use crate::AuthenticatorRef;

/// Resolves the identifier stored in a persisted record to a live
/// authenticator.
///
/// `lookup` receives whatever string was in the store, which may be stale
/// or hand-edited. Unknown names must simply yield `None`.
pub trait AuthenticatorResolver: Send + Sync + 'static {
    /// Returns the authenticator registered under `id`, if any.
    fn lookup(&self, id: &str) -> Option<AuthenticatorRef>;
}

/// Any `Fn(&str) -> Option<AuthenticatorRef>` is a resolver.
impl<F> AuthenticatorResolver for F
where
    F: Fn(&str) -> Option<AuthenticatorRef> + Send + Sync + 'static,
{
    fn lookup(&self, id: &str) -> Option<AuthenticatorRef> {
        self(id)
    }
}

/// A resolver backed by a map from [`AuthenticatorId`] to authenticator.
///
/// Authenticators are registered under their own
/// [`id()`](crate::Authenticator::id), which is exactly what the session
/// writes into the store, so registering is all it takes for restore to
/// find them again.
#[derive(Clone, Default)]
pub struct AuthenticatorRegistry {
    entries: HashMap<AuthenticatorId, AuthenticatorRef>,
}

impl AuthenticatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an authenticator under its id.
    ///
    /// Returns the authenticator previously registered under that id.
    pub fn register(&mut self, authenticator: AuthenticatorRef) -> Option<AuthenticatorRef> {
        let id = authenticator.id();
        tracing::debug!(authenticator = %id, "authenticator registered");
        self.entries.insert(id, authenticator)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, authenticator: AuthenticatorRef) -> Self {
        self.register(authenticator);
        self
    }

    /// Returns the authenticator registered under `id`.
    pub fn get(&self, id: &str) -> Option<&AuthenticatorRef> {
        self.entries.get(id)
    }

    /// Lists registered ids.
    pub fn ids(&self) -> Vec<AuthenticatorId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AuthenticatorResolver for AuthenticatorRegistry {
    fn lookup(&self, id: &str) -> Option<AuthenticatorRef> {
        self.entries.get(id).cloned()
    }
}

impl std::fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
