//! In-memory store, shareable between execution contexts.
//!
//! A [`SharedStorage`] is the storage medium itself; an [`EphemeralStore`]
//! is one context's view of it. Two stores opened on the same storage
//! behave like two browser tabs on the same local storage: each sees the
//! other's writes as external change notifications.
//!
//! ```text
//!   EphemeralStore (ctx 1) ──persist──┐
//!                                     ▼
//!                              SharedStorage ──notify──→ subscribers of ctx 2, ctx 3…
//!                                     ▲
//!   EphemeralStore (ctx 2) ──clear────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use latchkey_protocol::Properties;
use tokio::sync::mpsc;

use crate::{Store, StoreError, StoreUpdates};

/// Context id used for writes that come from outside every store.
const EXTERNAL_CONTEXT: u64 = 0;

/// One subscriber registered by one context.
struct Listener {
    context: u64,
    sender: mpsc::UnboundedSender<Properties>,
}

struct StorageInner {
    data: Properties,
    listeners: Vec<Listener>,
    next_context: u64,
}

impl StorageInner {
    /// Replaces the record and notifies every context except `origin`.
    ///
    /// Returns `false` (and notifies nobody) if nothing changed.
    fn write(&mut self, origin: u64, data: Properties) -> bool {
        if self.data == data {
            return false;
        }
        self.data = data;

        // Drop listeners whose receiver is gone while we're at it.
        self.listeners.retain(|listener| {
            if listener.context == origin {
                return !listener.sender.is_closed();
            }
            listener.sender.send(self.data.clone()).is_ok()
        });
        true
    }
}

// ---------------------------------------------------------------------------
// SharedStorage
// ---------------------------------------------------------------------------

/// The in-memory medium several [`EphemeralStore`]s can share.
///
/// Cheap to clone: clones point at the same storage.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<StorageInner>>,
}

impl SharedStorage {
    /// Creates empty storage with no contexts.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StorageInner {
                data: Properties::new(),
                listeners: Vec::new(),
                next_context: EXTERNAL_CONTEXT + 1,
            })),
        }
    }

    /// Opens a new context on this storage.
    pub fn open(&self) -> EphemeralStore {
        let context = {
            let mut inner = self.lock_or_recover();
            let context = inner.next_context;
            inner.next_context += 1;
            context
        };
        EphemeralStore {
            storage: self.clone(),
            context,
        }
    }

    /// Returns a copy of the current record.
    pub fn snapshot(&self) -> Properties {
        self.lock_or_recover().data.clone()
    }

    /// Overwrites the record as a writer outside every context would.
    /// All contexts' subscribers are notified.
    pub fn write_external(&self, data: Properties) -> bool {
        self.lock_or_recover().write(EXTERNAL_CONTEXT, data)
    }

    /// Clears the record as a writer outside every context would.
    pub fn clear_external(&self) -> bool {
        self.lock_or_recover().write(EXTERNAL_CONTEXT, Properties::new())
    }

    /// Number of live subscriptions across all contexts.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock_or_recover();
        inner.listeners.retain(|listener| !listener.sender.is_closed());
        inner.listeners.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StorageInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("shared storage lock poisoned".into()))
    }

    /// For accessors that can't report errors. The data is a plain map,
    /// so a panic mid-write can't leave it half-updated.
    fn lock_or_recover(&self) -> MutexGuard<'_, StorageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedStorage {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EphemeralStore
// ---------------------------------------------------------------------------

/// A [`Store`] backed by memory.
///
/// Created standalone with [`EphemeralStore::new`] (its own private
/// storage) or as one of several contexts with [`SharedStorage::open`] /
/// [`EphemeralStore::attach`].
pub struct EphemeralStore {
    storage: SharedStorage,
    context: u64,
}

impl EphemeralStore {
    /// Creates a store with its own, unshared storage.
    pub fn new() -> Self {
        SharedStorage::new().open()
    }

    /// Opens a new context on existing storage.
    pub fn attach(storage: &SharedStorage) -> Self {
        storage.open()
    }

    /// The storage this store writes to.
    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }
}

impl Default for EphemeralStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for EphemeralStore {
    fn persist(&self, data: &Properties) -> Result<(), StoreError> {
        let changed = self.storage.lock()?.write(self.context, data.clone());
        tracing::trace!(context = self.context, changed, "ephemeral store persisted");
        Ok(())
    }

    fn restore(&self) -> Result<Properties, StoreError> {
        Ok(self.storage.lock()?.data.clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let changed = self.storage.lock()?.write(self.context, Properties::new());
        tracing::trace!(context = self.context, changed, "ephemeral store cleared");
        Ok(())
    }

    fn subscribe(&self) -> Option<StoreUpdates> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.storage.lock_or_recover().listeners.push(Listener {
            context: self.context,
            sender: tx,
        });
        Some(rx)
    }
}
