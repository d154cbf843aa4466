//! `SessionBuilder`: configure and start a session.

use latchkey_session::{AuthenticatorResolver, Session, SessionConfig};
use latchkey_store::Store;

/// Builder for configuring and starting a [`Session`].
///
/// # Example
///
/// ```rust,ignore
/// use latchkey::prelude::*;
///
/// let session = SessionBuilder::new()
///     .command_buffer(16)
///     .start(EphemeralStore::new(), registry);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how many requests may wait for the session task.
    pub fn command_buffer(mut self, size: usize) -> Self {
        self.config.command_buffer = size;
        self
    }

    /// Sets whether the persisted session is restored on start.
    pub fn restore_on_start(mut self, restore: bool) -> Self {
        self.config.restore_on_start = restore;
        self
    }

    /// Spawns the session task on the current Tokio runtime.
    pub fn start<S, R>(self, store: S, resolver: R) -> Session
    where
        S: Store,
        R: AuthenticatorResolver,
    {
        tracing::debug!(
            command_buffer = self.config.command_buffer,
            restore_on_start = self.config.restore_on_start,
            "starting session"
        );
        Session::spawn(store, resolver, self.config)
    }
}
