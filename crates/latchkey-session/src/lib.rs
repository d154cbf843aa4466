//! Client-side authentication session for Latchkey.
//!
//! This crate owns the state machine that decides whether the user is
//! authenticated, and keeps that answer consistent while three pluggable
//! collaborators do their asynchronous, possibly-failing work:
//!
//! 1. **Authenticators**: perform the actual credential exchange
//!    ([`Authenticator`] trait) and may push refreshed properties at any
//!    time ([`SessionEvents`])
//! 2. **Stores**: persist the session between runs and report changes
//!    made elsewhere ([`Store`](latchkey_store::Store))
//! 3. **Resolvers**: turn a persisted authenticator name back into a live
//!    authenticator ([`AuthenticatorResolver`], [`AuthenticatorRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Application  ← calls Session::authenticate / invalidate, watches state
//!     ↕
//! Session Layer (this crate)  ← one task per session, one transition at a time
//!     ↕
//! Store Layer  ← persists the flat record, emits external changes
//!     ↕
//! Protocol Layer  ← Properties, PersistedRecord, codecs
//! ```

mod actor;
mod authenticator;
mod error;
mod events;
mod resolver;
mod session;

pub use actor::Session;
pub use authenticator::{Authenticator, AuthenticatorRef, same_authenticator};
pub use error::{AuthenticatorError, SessionError};
pub use events::{SessionEvents, Subscription, SubscriptionId};
pub use resolver::{AuthenticatorRegistry, AuthenticatorResolver};
pub use session::{SessionConfig, SessionState};

/// Re-exported so authenticator implementations don't need their own
/// `async-trait` dependency.
pub use async_trait::async_trait;
