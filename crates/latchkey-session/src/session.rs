//! Session types: configuration and the observable state.

use std::fmt;

use latchkey_protocol::{AuthenticatorId, Properties};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AuthenticatorRef, same_authenticator};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for a session task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the command channel into the session task. When it is
    /// full, `authenticate`/`invalidate` callers wait for room.
    ///
    /// Default: 64.
    pub command_buffer: usize,

    /// Whether the task restores a persisted session as soon as it starts.
    ///
    /// Default: `true`. Turning it off leaves the persisted record alone
    /// until the first external store change or explicit `authenticate`.
    pub restore_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            restore_on_start: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Whether the session is authenticated, and with what.
///
/// A two-state machine:
///
/// ```text
///                 authenticate ok / restore ok / update
///              ┌──────────────────────────────────────────┐
///              │                                          ▼
///   Unauthenticated                                 Authenticated
///              ▲                                          │
///              └──────────────────────────────────────────┘
///       invalidate ok / authenticate err / restore err / record cleared
/// ```
///
/// "Authenticated", "has an authenticator" and "has content" always hold
/// together: there's no way to build an `Authenticated` value missing
/// either, and no way to build an `Unauthenticated` one carrying them.
#[derive(Clone, Default)]
pub enum SessionState {
    /// No session. The initial state.
    #[default]
    Unauthenticated,

    /// A session produced by `authenticator`.
    Authenticated {
        /// The authenticator responsible for this session.
        authenticator: AuthenticatorRef,
        /// The properties it produced.
        content: Properties,
    },
}

impl SessionState {
    /// Returns `true` if the session is authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// The session content, `None` when unauthenticated.
    pub fn content(&self) -> Option<&Properties> {
        match self {
            Self::Authenticated { content, .. } => Some(content),
            Self::Unauthenticated => None,
        }
    }

    /// The bound authenticator, `None` when unauthenticated.
    pub fn authenticator(&self) -> Option<&AuthenticatorRef> {
        match self {
            Self::Authenticated { authenticator, .. } => Some(authenticator),
            Self::Unauthenticated => None,
        }
    }

    /// The bound authenticator's id, `None` when unauthenticated.
    pub fn authenticator_id(&self) -> Option<AuthenticatorId> {
        self.authenticator().map(|authenticator| authenticator.id())
    }

    /// Reads one content property: `state.get("token")`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content().and_then(|content| content.get(key))
    }
}

/// Two states are equal if they're both unauthenticated, or both bound to
/// the *same authenticator instance* with equal content.
impl PartialEq for SessionState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unauthenticated, Self::Unauthenticated) => true,
            (
                Self::Authenticated {
                    authenticator: a,
                    content: ca,
                },
                Self::Authenticated {
                    authenticator: b,
                    content: cb,
                },
            ) => same_authenticator(a, b) && ca == cb,
            _ => false,
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("Unauthenticated"),
            Self::Authenticated {
                authenticator,
                content,
            } => f
                .debug_struct("Authenticated")
                .field("authenticator", &authenticator.id())
                .field("content", content)
                .finish(),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Authenticated { authenticator, .. } => {
                write!(f, "Authenticated({})", authenticator.id())
            }
        }
    }
}
