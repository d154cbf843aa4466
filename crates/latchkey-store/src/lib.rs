//! Session persistence for Latchkey.
//!
//! A store keeps the flat persisted record (see
//! [`PersistedRecord`](latchkey_protocol::PersistedRecord)) between runs,
//! and tells the session when somebody *else* changed it.
//!
//! # Provided stores
//!
//! - [`EphemeralStore`]: in-memory, optionally shared between several
//!   execution contexts through a [`SharedStorage`]. A write in one
//!   context shows up as a change notification in the others, the same
//!   way a second browser tab sees local storage change.
//! - [`FileStore`]: one file on disk, encoded with a
//!   [`Codec`](latchkey_protocol::Codec). Survives process restarts.

mod ephemeral;
mod error;
mod file;

pub use ephemeral::{EphemeralStore, SharedStorage};
pub use error::StoreError;
pub use file::FileStore;

use std::sync::Arc;

use latchkey_protocol::Properties;
use tokio::sync::mpsc;

/// Receiver for external change notifications.
///
/// Each message is the full persisted record as it looks after the change.
pub type StoreUpdates = mpsc::UnboundedReceiver<Properties>;

/// Durable key/value persistence for session properties.
///
/// The methods are synchronous: every store we ship finishes a write in
/// microseconds, and the session calls them from inside its own task
/// where a short blocking write is acceptable.
///
/// # Contract
///
/// - `persist` overwrites the full record.
/// - `restore` returns the current record, or an empty map if none.
/// - `clear` removes the record.
/// - `subscribe` yields a receiver of changes made through any channel
///   *other* than this instance's own `persist`/`clear`. Stores without
///   such a channel keep the default (`None`).
pub trait Store: Send + Sync + 'static {
    /// Overwrites the persisted record with `data`.
    fn persist(&self, data: &Properties) -> Result<(), StoreError>;

    /// Returns the persisted record (empty if nothing is stored).
    fn restore(&self) -> Result<Properties, StoreError>;

    /// Removes the persisted record.
    fn clear(&self) -> Result<(), StoreError>;

    /// Subscribes to external change notifications.
    fn subscribe(&self) -> Option<StoreUpdates> {
        None
    }
}

/// Lets callers keep a handle on a store they hand to a session.
impl<S: Store> Store for Arc<S> {
    fn persist(&self, data: &Properties) -> Result<(), StoreError> {
        (**self).persist(data)
    }

    fn restore(&self) -> Result<Properties, StoreError> {
        (**self).restore()
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }

    fn subscribe(&self) -> Option<StoreUpdates> {
        (**self).subscribe()
    }
}
