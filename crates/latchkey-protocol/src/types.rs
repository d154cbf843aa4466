//! Core types for Latchkey's persisted session format.
//!
//! A session that survives a reload is stored as ONE flat map: every
//! property the authenticator produced, plus a reserved entry naming the
//! authenticator that produced them.
//!
//! ```text
//! {
//!   "authenticator": "app::TokenAuthenticator",   ← reserved key
//!   "token": "f00d…",                             ← content
//!   "user_id": 42                                 ← content
//! }
//! ```

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The reserved record key holding the authenticator's identifier.
pub const AUTHENTICATOR_KEY: &str = "authenticator";

/// Arbitrary session properties: tokens, user ids, expiry times.
///
/// This is the "content" of an authenticated session and also the shape
/// of the options passed to an authenticator. It is a JSON object because
/// authenticators are free to return whatever their exchange produced.
pub type Properties = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// AuthenticatorId
// ---------------------------------------------------------------------------

/// The name under which an authenticator is persisted and looked up again.
///
/// Newtype over `String` so an identifier can't be confused with a
/// property value. `#[serde(transparent)]` serializes it as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthenticatorId(String);

impl AuthenticatorId {
    /// Creates an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthenticatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lets maps keyed by `AuthenticatorId` be queried with a plain `&str`.
impl Borrow<str> for AuthenticatorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AuthenticatorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AuthenticatorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// PersistedRecord
// ---------------------------------------------------------------------------

/// A persisted session, split into its two logical halves.
///
/// Stores only ever see the flat form ([`to_properties`](Self::to_properties));
/// the session only ever works with the split form. Converting between
/// them is the single place that knows about [`AUTHENTICATOR_KEY`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersistedRecord {
    /// Which authenticator produced `content`. `None` means there is no
    /// recoverable session in this record.
    pub authenticator: Option<AuthenticatorId>,

    /// The session properties, without the reserved key.
    pub content: Properties,
}

impl PersistedRecord {
    /// Creates a record for an authenticated session.
    pub fn new(authenticator: impl Into<AuthenticatorId>, content: Properties) -> Self {
        Self {
            authenticator: Some(authenticator.into()),
            content,
        }
    }

    /// Splits a flat store record into identifier and content.
    ///
    /// The reserved key is always removed from the content. If its value
    /// isn't a string (stale or tampered data), the record is treated as
    /// having no authenticator at all.
    pub fn from_properties(mut properties: Properties) -> Self {
        let authenticator = match properties.remove(AUTHENTICATOR_KEY) {
            Some(Value::String(id)) => Some(AuthenticatorId(id)),
            Some(other) => {
                tracing::debug!(value = %other, "ignoring non-string authenticator identifier");
                None
            }
            None => None,
        };

        Self {
            authenticator,
            content: properties,
        }
    }

    /// Joins identifier and content back into the flat store form.
    ///
    /// The reserved key wins: a content property that happens to be named
    /// `authenticator` is dropped, otherwise restoring would resolve the
    /// wrong authenticator.
    pub fn into_properties(self) -> Properties {
        let mut properties = self.content;
        if let Some(id) = self.authenticator {
            if properties.contains_key(AUTHENTICATOR_KEY) {
                tracing::warn!(
                    authenticator = %id,
                    "content property `authenticator` shadows the reserved key, dropping it"
                );
            }
            properties.insert(AUTHENTICATOR_KEY.to_owned(), Value::String(id.0));
        }
        properties
    }

    /// Same as [`into_properties`](Self::into_properties), without consuming.
    pub fn to_properties(&self) -> Properties {
        self.clone().into_properties()
    }

    /// Returns `true` if the record carries neither identifier nor content.
    pub fn is_empty(&self) -> bool {
        self.authenticator.is_none() && self.content.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
