//! Session actor: a Tokio task that owns the session state machine.
//!
//! Everything that can change the session (caller requests, external store
//! changes, updates pushed by the bound authenticator) arrives as a message
//! in one task and is handled to completion before the next one is looked
//! at. While a transition is awaiting its authenticator, later requests
//! wait in the command channel.
//!
//! ```text
//!   Session (handle) ──commands──┐
//!   Store ─────────────updates───┼──→ SessionActor ──watch──→ observers
//!   bound Authenticator ─updates─┘         │
//!                                          └──persist / clear──→ Store
//! ```

use std::sync::Arc;

use latchkey_protocol::{AUTHENTICATOR_KEY, PersistedRecord, Properties};
use latchkey_store::{Store, StoreUpdates};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    AuthenticatorRef, AuthenticatorResolver, SessionConfig, SessionError, SessionEvents,
    SessionState, Subscription, same_authenticator,
};

/// Commands sent to the session actor through its channel.
pub(crate) enum SessionCommand {
    /// Authenticate with the given authenticator and options.
    Authenticate {
        authenticator: AuthenticatorRef,
        options: Properties,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Invalidate the current session.
    Invalidate {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Reply with the state once everything queued before has been handled.
    Settle { reply: oneshot::Sender<SessionState> },

    SetAttemptedTransition { transition: String },

    TakeAttemptedTransition {
        reply: oneshot::Sender<Option<String>>,
    },

    /// Stop the actor.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Session (handle)
// ---------------------------------------------------------------------------

/// Handle to a running session.
///
/// Cheap to clone: every clone talks to the same session task. The task
/// stops when [`shutdown`](Self::shutdown) is called or the last handle is
/// dropped.
///
/// Reads (`state`, `is_authenticated`, `content`, ...) never wait: they
/// look at the most recently published state. Writes (`authenticate`,
/// `invalidate`) are queued and handled one at a time, in order.
#[derive(Clone)]
pub struct Session {
    sender: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl Session {
    /// Spawns the session task and returns a handle to it.
    ///
    /// Must be called from within a Tokio runtime. The task subscribes to
    /// the store's change notifications and, if
    /// [`restore_on_start`](SessionConfig::restore_on_start) is set,
    /// restores the persisted session before it handles any request.
    pub fn spawn<S, R>(store: S, resolver: R, config: SessionConfig) -> Self
    where
        S: Store,
        R: AuthenticatorResolver,
    {
        let (sender, receiver) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(SessionState::Unauthenticated);

        let actor = SessionActor {
            store,
            resolver,
            state: state_tx,
            bound: None,
            store_updates: None,
            attempted_transition: None,
            restore_on_start: config.restore_on_start,
            receiver,
        };
        tokio::spawn(actor.run());

        Self {
            sender,
            state: state_rx,
        }
    }

    /// Authenticates with `authenticator`, passing it `options`.
    ///
    /// On success the session is authenticated with whatever the
    /// authenticator returned, bound to it, and persisted. On failure the
    /// session is unauthenticated and the store cleared, whatever it was
    /// before.
    pub async fn authenticate(
        &self,
        authenticator: AuthenticatorRef,
        options: Properties,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Authenticate {
                authenticator,
                options,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }

    /// Invalidates the session through the bound authenticator.
    ///
    /// Fails with [`SessionError::NotAuthenticated`] if there's nothing to
    /// invalidate, and with [`SessionError::InvalidationRejected`] if the
    /// authenticator refused, in which case the session is left exactly as
    /// it was.
    pub async fn invalidate(&self) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Invalidate { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }

    /// Waits until every request and notification that reached the session
    /// before this call has been handled, then returns the state.
    pub async fn settled(&self) -> Result<SessionState, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Settle { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// A copy of the session content, `None` when unauthenticated.
    pub fn content(&self) -> Option<Properties> {
        self.state.borrow().content().cloned()
    }

    /// Reads one content property.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.borrow().get(key).cloned()
    }

    /// The bound authenticator, `None` when unauthenticated.
    pub fn authenticator(&self) -> Option<AuthenticatorRef> {
        self.state.borrow().authenticator().cloned()
    }

    /// Subscribes to state changes.
    ///
    /// The receiver is notified whenever the session becomes
    /// authenticated or unauthenticated, its content changes, or it is
    /// rebound to another authenticator. Writes that leave the state
    /// exactly as it was don't notify. The current state counts as seen.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        let mut receiver = self.state.clone();
        receiver.borrow_and_update();
        receiver
    }

    /// Remembers where the application wanted to go before it found out it
    /// needed a session. The session only stores it.
    pub async fn set_attempted_transition(
        &self,
        transition: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::SetAttemptedTransition {
                transition: transition.into(),
            })
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    /// Takes the remembered transition, leaving the slot empty.
    pub async fn take_attempted_transition(&self) -> Result<Option<String>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::TakeAttemptedTransition { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Tells the session task to stop once the requests queued before this
    /// one are handled.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    /// Returns `false` once the session task has stopped.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionActor
// ---------------------------------------------------------------------------

/// The authenticator the session is subscribed to.
///
/// At most one exists at a time, and only while the session is
/// authenticated.
struct Binding {
    authenticator: AuthenticatorRef,
    /// `None` for authenticators that never emit updates.
    subscription: Option<Subscription>,
}

impl Binding {
    fn new(authenticator: &AuthenticatorRef) -> Self {
        Self {
            authenticator: Arc::clone(authenticator),
            subscription: authenticator.session_events().map(SessionEvents::subscribe),
        }
    }

    /// Unsubscribes. Updates already queued on the subscription are
    /// dropped with it.
    fn release(self) {
        if let (Some(subscription), Some(events)) =
            (self.subscription, self.authenticator.session_events())
        {
            events.unsubscribe(subscription.id());
        }
    }
}

/// The internal session state. Runs inside a Tokio task.
struct SessionActor<S, R> {
    store: S,
    resolver: R,
    /// Publishes every state change to the handles.
    state: watch::Sender<SessionState>,
    bound: Option<Binding>,
    store_updates: Option<StoreUpdates>,
    attempted_transition: Option<String>,
    restore_on_start: bool,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl<S: Store, R: AuthenticatorResolver> SessionActor<S, R> {
    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        tracing::info!("session actor started");

        // Subscribe before reading the record so no change slips between.
        self.store_updates = self.store.subscribe();
        if self.restore_on_start {
            self.restore_persisted().await;
        }

        // Notifications first: a request sees the effect of every
        // notification delivered before it. The flip side is that a steady
        // stream of notifications starves requests, e.g. two contexts whose
        // authenticator's `restore` returns different content every time
        // keep rewriting the record for each other.
        loop {
            tokio::select! {
                biased;

                data = next_store_update(&mut self.store_updates) => {
                    self.handle_store_update(data).await;
                }
                content = next_bound_update(&mut self.bound) => {
                    self.handle_authenticator_update(content);
                }
                cmd = self.receiver.recv() => match cmd {
                    Some(SessionCommand::Authenticate {
                        authenticator,
                        options,
                        reply,
                    }) => {
                        let result = self.handle_authenticate(authenticator, options).await;
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Invalidate { reply }) => {
                        let result = self.handle_invalidate().await;
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Settle { reply }) => {
                        let _ = reply.send(self.state.borrow().clone());
                    }
                    Some(SessionCommand::SetAttemptedTransition { transition }) => {
                        self.attempted_transition = Some(transition);
                    }
                    Some(SessionCommand::TakeAttemptedTransition { reply }) => {
                        let _ = reply.send(self.attempted_transition.take());
                    }
                    Some(SessionCommand::Shutdown) => {
                        tracing::info!("session shutting down");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.unbind();
        tracing::info!("session actor stopped");
    }

    // -- transitions ---------------------------------------------------------

    /// Restores whatever the store holds right now.
    async fn restore_persisted(&mut self) {
        let data = self.store.restore().unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to read persisted session");
            Properties::new()
        });
        self.restore_from(PersistedRecord::from_properties(data)).await;
    }

    async fn handle_authenticate(
        &mut self,
        authenticator: AuthenticatorRef,
        options: Properties,
    ) -> Result<(), SessionError> {
        let id = authenticator.id();
        match authenticator.authenticate(options).await {
            Ok(content) => {
                tracing::info!(authenticator = %id, "session authenticated");
                self.setup(authenticator, content);
                Ok(())
            }
            Err(error) => {
                tracing::info!(authenticator = %id, %error, "authentication failed");
                self.clear();
                Err(SessionError::AuthenticationFailed(error))
            }
        }
    }

    async fn handle_invalidate(&mut self) -> Result<(), SessionError> {
        let current = self.state.borrow().clone();
        let SessionState::Authenticated {
            authenticator,
            content,
        } = current
        else {
            return Err(SessionError::NotAuthenticated);
        };

        let id = authenticator.id();
        if let Err(error) = authenticator.invalidate(&content).await {
            tracing::info!(authenticator = %id, %error, "invalidation rejected, session kept");
            return Err(SessionError::InvalidationRejected(error));
        }

        tracing::info!(authenticator = %id, "session invalidated");
        self.clear();
        Ok(())
    }

    /// Some other context changed the store.
    async fn handle_store_update(&mut self, notified: Properties) {
        // The notification may be stale by the time it's handled. Trust
        // the store over the message.
        let data = match self.store.restore() {
            Ok(current) if current != notified => {
                // Our own write landed after the one being reported.
                if Some(&current) == self.current_record().as_ref() {
                    tracing::debug!("store notification superseded by own write, ignoring");
                    return;
                }
                tracing::debug!("store notification superseded, using current record");
                current
            }
            Ok(_) => notified,
            Err(error) => {
                tracing::warn!(%error, "failed to re-read store, using notified record");
                notified
            }
        };

        tracing::debug!(keys = data.len(), "external store update");
        self.restore_from(PersistedRecord::from_properties(data)).await;
    }

    /// The bound authenticator pushed new content.
    fn handle_authenticator_update(&mut self, content: Properties) {
        let Some(authenticator) = self.bound.as_ref().map(|b| Arc::clone(&b.authenticator)) else {
            return;
        };
        tracing::debug!(authenticator = %authenticator.id(), "authenticator updated session");
        self.setup(authenticator, content);
    }

    async fn restore_from(&mut self, record: PersistedRecord) {
        match self.try_restore(record).await {
            Ok(()) => {}
            Err(SessionError::NoPersistedSession) => {
                tracing::debug!("no persisted session");
                self.clear();
            }
            Err(error) => {
                tracing::debug!(%error, "persisted session discarded");
                self.clear();
            }
        }
    }

    async fn try_restore(&mut self, record: PersistedRecord) -> Result<(), SessionError> {
        let id = record.authenticator.ok_or(SessionError::NoPersistedSession)?;
        let authenticator = self
            .resolver
            .lookup(id.as_str())
            .ok_or_else(|| SessionError::UnresolvableAuthenticator(id.clone()))?;

        let content = authenticator
            .restore(record.content)
            .await
            .map_err(SessionError::RestoreFailed)?;

        tracing::info!(authenticator = %id, "session restored");
        self.setup(authenticator, content);
        Ok(())
    }

    // -- primitives ----------------------------------------------------------

    /// Enters (or stays in) `Authenticated` and persists the record.
    fn setup(&mut self, authenticator: AuthenticatorRef, mut content: Properties) {
        self.bind(&authenticator);

        // The record can't hold it, so memory doesn't either.
        if content.remove(AUTHENTICATOR_KEY).is_some() {
            tracing::warn!(
                authenticator = %authenticator.id(),
                "content property `authenticator` is reserved, dropping it"
            );
        }

        let record = PersistedRecord::new(authenticator.id(), content.clone()).into_properties();
        let next = SessionState::Authenticated {
            authenticator,
            content,
        };
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        tracing::trace!(changed, "session set up");

        self.write_record(&record);
    }

    /// Enters (or stays in) `Unauthenticated` and clears the store.
    fn clear(&mut self) {
        self.unbind();

        let changed = self.state.send_if_modified(|state| {
            if !state.is_authenticated() {
                return false;
            }
            *state = SessionState::Unauthenticated;
            true
        });
        tracing::trace!(changed, "session cleared");

        match self.store.restore() {
            Ok(current) if current.is_empty() => {}
            _ => {
                if let Err(error) = self.store.clear() {
                    tracing::warn!(%error, "failed to clear store");
                }
            }
        }
    }

    /// Subscribes to `authenticator`'s updates, replacing any previous
    /// binding. Binding the instance that's already bound keeps the
    /// existing subscription.
    fn bind(&mut self, authenticator: &AuthenticatorRef) {
        if let Some(binding) = &self.bound {
            if same_authenticator(&binding.authenticator, authenticator) {
                return;
            }
        }
        self.unbind();
        tracing::debug!(authenticator = %authenticator.id(), "authenticator bound");
        self.bound = Some(Binding::new(authenticator));
    }

    fn unbind(&mut self) {
        if let Some(binding) = self.bound.take() {
            tracing::debug!(authenticator = %binding.authenticator.id(), "authenticator unbound");
            binding.release();
        }
    }

    /// The record the store should hold for the current state.
    fn current_record(&self) -> Option<Properties> {
        match &*self.state.borrow() {
            SessionState::Authenticated {
                authenticator,
                content,
            } => Some(PersistedRecord::new(authenticator.id(), content.clone()).into_properties()),
            SessionState::Unauthenticated => None,
        }
    }

    /// Clear-then-persist, skipped when the store already holds `record`.
    fn write_record(&self, record: &Properties) {
        match self.store.restore() {
            Ok(current) if current == *record => return,
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "failed to read store before write"),
        }

        if let Err(error) = self.store.clear() {
            tracing::warn!(%error, "failed to clear store");
        }
        if let Err(error) = self.store.persist(record) {
            tracing::warn!(%error, "failed to persist session");
        }
    }
}

/// Next external store change. Never resolves without a subscription.
async fn next_store_update(updates: &mut Option<StoreUpdates>) -> Properties {
    if let Some(receiver) = updates {
        if let Some(data) = receiver.recv().await {
            return data;
        }
        // The store dropped its end: stop polling it.
        *updates = None;
    }
    std::future::pending().await
}

/// Next update from the bound authenticator. Never resolves while nothing
/// is bound.
async fn next_bound_update(bound: &mut Option<Binding>) -> Properties {
    if let Some(subscription) = bound.as_mut().and_then(|b| b.subscription.as_mut()) {
        if let Some(content) = subscription.recv().await {
            return content;
        }
    }
    std::future::pending().await
}
