//! # Latchkey
//!
//! Client-side authentication sessions.
//!
//! Latchkey tracks whether the user is authenticated, keeps the
//! properties the last successful exchange produced, persists them across
//! restarts, and restores them on startup or when another context sharing
//! the same storage logs in or out. You bring an [`Authenticator`] that
//! knows how to talk to your backend; Latchkey runs the state machine
//! around it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use latchkey::prelude::*;
//!
//! struct TokenAuthenticator;
//!
//! #[async_trait]
//! impl Authenticator for TokenAuthenticator {
//!     fn id(&self) -> AuthenticatorId {
//!         AuthenticatorId::new("token")
//!     }
//!
//!     async fn restore(&self, properties: Properties) -> Result<Properties, AuthenticatorError> {
//!         Ok(properties)
//!     }
//!
//!     async fn authenticate(&self, options: Properties) -> Result<Properties, AuthenticatorError> {
//!         Ok(options)
//!     }
//! }
//!
//! # async fn run() -> Result<(), LatchkeyError> {
//! let token: AuthenticatorRef = Arc::new(TokenAuthenticator);
//! let session = SessionBuilder::new().start(
//!     FileStore::new("session.json"),
//!     AuthenticatorRegistry::new().with(Arc::clone(&token)),
//! );
//!
//! let options = json!({ "token": "f00d" }).as_object().cloned().unwrap_or_default();
//! session.authenticate(token, options).await?;
//! assert!(session.is_authenticated());
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;
pub mod logging;

pub use builder::SessionBuilder;
pub use error::LatchkeyError;

pub use latchkey_protocol as protocol;
pub use latchkey_session as session;
pub use latchkey_store as store;

/// Everything needed to write an authenticator and run a session.
pub mod prelude {
    pub use crate::{LatchkeyError, SessionBuilder};
    pub use latchkey_protocol::{AuthenticatorId, PersistedRecord, Properties};
    pub use latchkey_session::{
        Authenticator, AuthenticatorError, AuthenticatorRef, AuthenticatorRegistry,
        AuthenticatorResolver, Session, SessionConfig, SessionError, SessionEvents,
        SessionState, async_trait,
    };
    pub use latchkey_store::{EphemeralStore, FileStore, SharedStorage, Store, StoreError};
    pub use serde_json::json;
}
