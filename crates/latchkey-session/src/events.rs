//! Session-updated notifications from authenticators.
//!
//! An authenticator that can change the session on its own (a background
//! token refresh, a server push saying the user's roles changed) embeds a
//! [`SessionEvents`] and returns it from
//! [`Authenticator::session_events`](crate::Authenticator::session_events).
//! The session subscribes when it binds the authenticator and unsubscribes
//! when it lets go of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use latchkey_protocol::Properties;
use tokio::sync::mpsc;

/// Identifies one subscription on one [`SessionEvents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<Properties>,
}

impl Subscription {
    /// The id to pass to [`SessionEvents::unsubscribe`].
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next update. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Properties> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered update, if any.
    pub fn try_recv(&mut self) -> Option<Properties> {
        self.receiver.try_recv().ok()
    }
}

/// Fire-and-forget emitter of "session updated" notifications.
///
/// Each subscriber gets its own unbounded channel, so `emit` never waits
/// on a slow session.
#[derive(Default)]
pub struct SessionEvents {
    listeners: Mutex<Vec<(SubscriptionId, mpsc::UnboundedSender<Properties>)>>,
    next_id: AtomicU64,
}

impl SessionEvents {
    /// Creates an emitter with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners().push((id, tx));
        Subscription { id, receiver: rx }
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    /// Delivers `content` to every subscriber.
    ///
    /// Returns how many subscribers received it. Subscribers whose
    /// receiving end was dropped are removed.
    pub fn emit(&self, content: Properties) -> usize {
        let mut listeners = self.listeners();
        listeners.retain(|(_, sender)| sender.send(content.clone()).is_ok());
        tracing::trace!(delivered = listeners.len(), "session update emitted");
        listeners.len()
    }

    /// Number of registered subscribers.
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(SubscriptionId, mpsc::UnboundedSender<Properties>)>> {
        // A Vec push/retain can't be observed half-done, so a poisoned
        // lock still holds a consistent list.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvents")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
