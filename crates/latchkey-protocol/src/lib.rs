//! Data model for Latchkey.
//!
//! This crate defines what a session *is* once it leaves memory:
//!
//! - **Types** ([`Properties`], [`AuthenticatorId`], [`PersistedRecord`]):
//!   the property map an authenticator produces, the name used to find the
//!   authenticator again, and the flat record a store keeps.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a record is turned
//!   into bytes for stores that need bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits below both the store and the session. It knows
//! nothing about authentication flows; it only knows the record layout.
//!
//! ```text
//! Session (state machine) → Protocol (PersistedRecord) → Store (bytes/map)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{AUTHENTICATOR_KEY, AuthenticatorId, PersistedRecord, Properties};
