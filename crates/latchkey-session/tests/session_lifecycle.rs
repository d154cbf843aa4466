//! Integration tests for the session state machine using mock
//! authenticators and in-memory stores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use latchkey_protocol::{AuthenticatorId, PersistedRecord, Properties};
use latchkey_session::{
    Authenticator, AuthenticatorError, AuthenticatorRef, AuthenticatorRegistry, Session,
    SessionConfig, SessionError, SessionEvents, async_trait, same_authenticator,
};
use latchkey_store::{FileStore, SharedStorage};
use serde_json::{Value, json};
use tokio::sync::Notify;

// =========================================================================
// Mock authenticator: echoes its input, fails on demand.
// =========================================================================

#[derive(Default)]
struct MockAuthenticator {
    name: &'static str,
    reject_restore: AtomicBool,
    reject_authenticate: AtomicBool,
    reject_invalidate: AtomicBool,
    restored: Mutex<Vec<Properties>>,
    authenticate_calls: AtomicUsize,
    invalidate_calls: AtomicUsize,
    events: SessionEvents,
}

impl MockAuthenticator {
    fn named(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            ..Self::default()
        })
    }

    fn as_dyn(self: &Arc<Self>) -> AuthenticatorRef {
        self.clone()
    }

    fn restored(&self) -> Vec<Properties> {
        self.restored.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    fn id(&self) -> AuthenticatorId {
        AuthenticatorId::new(self.name)
    }

    async fn restore(&self, properties: Properties) -> Result<Properties, AuthenticatorError> {
        self.restored.lock().unwrap().push(properties.clone());
        if self.reject_restore.load(Ordering::SeqCst) {
            return Err(AuthenticatorError::rejected("token expired"));
        }
        Ok(properties)
    }

    async fn authenticate(&self, options: Properties) -> Result<Properties, AuthenticatorError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_authenticate.load(Ordering::SeqCst) {
            return Err(AuthenticatorError::rejected("bad credentials"));
        }
        Ok(options)
    }

    async fn invalidate(&self, _content: &Properties) -> Result<(), AuthenticatorError> {
        if self.reject_invalidate.load(Ordering::SeqCst) {
            return Err(AuthenticatorError::rejected("server unreachable"));
        }
        self.invalidate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn session_events(&self) -> Option<&SessionEvents> {
        Some(&self.events)
    }
}

/// Blocks inside `authenticate` until released.
#[derive(Default)]
struct GatedAuthenticator {
    entered: Notify,
    release: Notify,
    events: SessionEvents,
}

#[async_trait]
impl Authenticator for GatedAuthenticator {
    fn id(&self) -> AuthenticatorId {
        AuthenticatorId::new("gated")
    }

    async fn authenticate(&self, options: Properties) -> Result<Properties, AuthenticatorError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(options)
    }

    fn session_events(&self) -> Option<&SessionEvents> {
        Some(&self.events)
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn props(value: Value) -> Properties {
    value.as_object().cloned().expect("test properties are objects")
}

fn token(value: &str) -> Properties {
    props(json!({ "token": value }))
}

fn registry_with(authenticators: &[&Arc<MockAuthenticator>]) -> AuthenticatorRegistry {
    authenticators
        .iter()
        .fold(AuthenticatorRegistry::new(), |registry, a| registry.with(a.as_dyn()))
}

/// Spawns a session on a fresh context of `storage` and waits for its
/// startup restore to finish.
async fn spawn_on(storage: &SharedStorage, registry: AuthenticatorRegistry) -> Session {
    let session = Session::spawn(storage.open(), registry, SessionConfig::default());
    session.settled().await.unwrap();
    session
}

// =========================================================================
// Initialization
// =========================================================================

#[tokio::test]
async fn test_fresh_session_with_empty_store_is_unauthenticated() {
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, AuthenticatorRegistry::new()).await;

    assert!(!session.is_authenticated());
    assert!(session.content().is_none());
    assert!(session.authenticator().is_none());
}

#[tokio::test]
async fn test_init_restores_persisted_session() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    storage.write_external(props(json!({ "authenticator": "mock", "token": "t1" })));

    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    assert!(session.is_authenticated());
    assert_eq!(session.content(), Some(token("t1")));
    assert!(same_authenticator(&session.authenticator().unwrap(), &mock.as_dyn()));
    // The reserved key never reaches the authenticator.
    assert_eq!(mock.restored(), vec![token("t1")]);
}

#[tokio::test]
async fn test_init_restore_rejected_clears_store() {
    let mock = MockAuthenticator::named("mock");
    mock.reject_restore.store(true, Ordering::SeqCst);
    let storage = SharedStorage::new();
    storage.write_external(props(json!({ "authenticator": "mock", "token": "t1" })));

    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    assert!(!session.is_authenticated());
    assert!(session.content().is_none());
    assert!(storage.snapshot().is_empty());
}

#[tokio::test]
async fn test_init_unresolvable_authenticator_clears_store() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    storage.write_external(props(json!({ "authenticator": "ghost", "token": "t1" })));

    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    assert!(!session.is_authenticated());
    assert!(storage.snapshot().is_empty());
    assert!(mock.restored().is_empty());
}

#[tokio::test]
async fn test_init_record_without_authenticator_clears_store() {
    let storage = SharedStorage::new();
    storage.write_external(props(json!({ "key1": "value1" })));

    let session = spawn_on(&storage, AuthenticatorRegistry::new()).await;

    assert!(!session.is_authenticated());
    assert!(storage.snapshot().is_empty());
}

#[tokio::test]
async fn test_init_skipped_when_restore_on_start_disabled() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let record = props(json!({ "authenticator": "mock", "token": "t1" }));
    storage.write_external(record.clone());

    let config = SessionConfig {
        restore_on_start: false,
        ..SessionConfig::default()
    };
    let session = Session::spawn(storage.open(), registry_with(&[&mock]), config);
    session.settled().await.unwrap();

    assert!(!session.is_authenticated());
    assert_eq!(storage.snapshot(), record);
    assert!(mock.restored().is_empty());
}

// =========================================================================
// Authenticate
// =========================================================================

#[tokio::test]
async fn test_authenticate_success_sets_state_and_persists() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();

    assert!(session.is_authenticated());
    assert_eq!(session.get("token"), Some(json!("t1")));
    assert!(same_authenticator(&session.authenticator().unwrap(), &mock.as_dyn()));

    let persisted = PersistedRecord::from_properties(storage.snapshot());
    assert_eq!(persisted.authenticator, Some(AuthenticatorId::new("mock")));
    assert_eq!(Some(persisted.content), session.content());
}

#[tokio::test]
async fn test_authenticate_failure_propagates_error_and_clears() {
    let mock = MockAuthenticator::named("mock");
    let failing = MockAuthenticator::named("failing");
    failing.reject_authenticate.store(true, Ordering::SeqCst);
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock, &failing])).await;
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();

    let result = session.authenticate(failing.as_dyn(), token("t2")).await;

    assert!(matches!(
        result,
        Err(SessionError::AuthenticationFailed(AuthenticatorError::Rejected(ref reason)))
            if reason == "bad credentials"
    ));
    assert!(!session.is_authenticated());
    assert!(session.authenticator().is_none());
    assert!(storage.snapshot().is_empty());
    assert_eq!(mock.events.listener_count(), 0);
}

#[tokio::test]
async fn test_authenticate_drops_reserved_key_from_content() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    session
        .authenticate(mock.as_dyn(), props(json!({ "authenticator": "github", "token": "t" })))
        .await
        .unwrap();

    let persisted = PersistedRecord::from_properties(storage.snapshot());
    assert_eq!(persisted.authenticator, Some(AuthenticatorId::new("mock")));
    assert_eq!(Some(persisted.content), session.content());
    assert_eq!(session.content(), Some(token("t")));
}

#[tokio::test]
async fn test_authenticate_with_other_authenticator_drops_stale_keys() {
    let first = MockAuthenticator::named("first");
    let second = MockAuthenticator::named("second");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&first, &second])).await;

    session
        .authenticate(first.as_dyn(), props(json!({ "token": "t1", "user_id": 7 })))
        .await
        .unwrap();
    session.authenticate(second.as_dyn(), token("t2")).await.unwrap();

    assert_eq!(
        storage.snapshot(),
        props(json!({ "authenticator": "second", "token": "t2" }))
    );
}

#[tokio::test]
async fn test_switching_authenticator_unbinds_previous() {
    let first = MockAuthenticator::named("first");
    let second = MockAuthenticator::named("second");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&first, &second])).await;

    session.authenticate(first.as_dyn(), token("t1")).await.unwrap();
    session.authenticate(second.as_dyn(), token("t2")).await.unwrap();

    assert_eq!(first.events.listener_count(), 0);
    assert_eq!(second.events.listener_count(), 1);

    assert_eq!(first.events.emit(token("stale")), 0);
    session.settled().await.unwrap();
    assert_eq!(session.get("token"), Some(json!("t2")));
}

// =========================================================================
// Invalidate
// =========================================================================

#[tokio::test]
async fn test_invalidate_success_clears_and_unbinds() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();

    session.invalidate().await.unwrap();

    assert!(!session.is_authenticated());
    assert!(session.content().is_none());
    assert!(storage.snapshot().is_empty());
    assert_eq!(mock.invalidate_calls.load(Ordering::SeqCst), 1);

    // Later updates from the old authenticator go nowhere.
    assert_eq!(mock.events.emit(token("t2")), 0);
    let state = session.settled().await.unwrap();
    assert!(!state.is_authenticated());
}

#[tokio::test]
async fn test_invalidate_rejected_keeps_session() {
    let mock = MockAuthenticator::named("mock");
    mock.reject_invalidate.store(true, Ordering::SeqCst);
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();
    let before = session.state();

    let result = session.invalidate().await;

    assert!(matches!(
        result,
        Err(SessionError::InvalidationRejected(AuthenticatorError::Rejected(_)))
    ));
    assert_eq!(session.state(), before);
    assert!(same_authenticator(&session.authenticator().unwrap(), &mock.as_dyn()));
    assert_eq!(mock.events.listener_count(), 1);
    assert!(!storage.snapshot().is_empty());
}

#[tokio::test]
async fn test_invalidate_while_unauthenticated_is_rejected() {
    let storage = SharedStorage::new();
    storage.write_external(props(json!({ "unrelated": true })));
    let session = Session::spawn(
        storage.open(),
        AuthenticatorRegistry::new(),
        SessionConfig {
            restore_on_start: false,
            ..SessionConfig::default()
        },
    );

    let result = session.invalidate().await;

    assert!(matches!(result, Err(SessionError::NotAuthenticated)));
    // Nothing was touched.
    assert_eq!(storage.snapshot(), props(json!({ "unrelated": true })));
}

// =========================================================================
// Authenticator updates
// =========================================================================

#[tokio::test]
async fn test_authenticator_update_replaces_content() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();

    assert_eq!(mock.events.emit(token("t2")), 1);
    session.settled().await.unwrap();

    assert_eq!(session.get("token"), Some(json!("t2")));
    assert!(same_authenticator(&session.authenticator().unwrap(), &mock.as_dyn()));
    assert_eq!(
        storage.snapshot(),
        props(json!({ "authenticator": "mock", "token": "t2" }))
    );
}

#[tokio::test]
async fn test_repeated_setup_keeps_single_subscription() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();
    session.authenticate(mock.as_dyn(), token("t2")).await.unwrap();

    assert_eq!(mock.events.listener_count(), 1);
    assert_eq!(mock.events.emit(token("t3")), 1);

    session.settled().await.unwrap();
    assert_eq!(session.get("token"), Some(json!("t3")));
}

// =========================================================================
// External store changes
// =========================================================================

#[tokio::test]
async fn test_external_store_update_restores_session() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    storage.write_external(props(json!({ "authenticator": "mock", "token": "t1" })));
    session.settled().await.unwrap();

    assert!(session.is_authenticated());
    assert_eq!(session.content(), Some(token("t1")));
    assert_eq!(mock.restored(), vec![token("t1")]);
}

#[tokio::test]
async fn test_external_clear_unauthenticates() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();

    storage.clear_external();
    session.settled().await.unwrap();

    assert!(!session.is_authenticated());
    assert_eq!(mock.events.listener_count(), 0);
}

#[tokio::test]
async fn test_external_update_with_rejected_restore_clears() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();

    mock.reject_restore.store(true, Ordering::SeqCst);
    storage.write_external(props(json!({ "authenticator": "mock", "token": "forged" })));
    session.settled().await.unwrap();

    assert!(!session.is_authenticated());
    assert!(storage.snapshot().is_empty());
}

#[tokio::test]
async fn test_two_contexts_follow_each_other() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let registry = registry_with(&[&mock]);
    let tab1 = spawn_on(&storage, registry.clone()).await;
    let tab2 = spawn_on(&storage, registry).await;

    tab1.authenticate(mock.as_dyn(), token("t1")).await.unwrap();
    let state = tab2.settled().await.unwrap();

    assert!(state.is_authenticated());
    assert_eq!(state.get("token"), Some(&json!("t1")));
    assert_eq!(mock.events.listener_count(), 2);

    tab1.invalidate().await.unwrap();
    let state = tab2.settled().await.unwrap();

    assert!(!state.is_authenticated());
    assert!(storage.snapshot().is_empty());
    assert_eq!(mock.invalidate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.events.listener_count(), 0);
}

// =========================================================================
// Ordering and observation
// =========================================================================

#[tokio::test]
async fn test_requests_are_queued_behind_in_flight_transition() {
    let mock = MockAuthenticator::named("mock");
    let gated = Arc::new(GatedAuthenticator::default());
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    let slow = tokio::spawn({
        let session = session.clone();
        let gated = gated.clone();
        async move { session.authenticate(gated, token("slow")).await }
    });
    gated.entered.notified().await;

    let fast = tokio::spawn({
        let session = session.clone();
        let mock = mock.as_dyn();
        async move { session.authenticate(mock, token("fast")).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    // The second request hasn't reached its authenticator yet.
    assert_eq!(mock.authenticate_calls.load(Ordering::SeqCst), 0);
    assert!(!session.is_authenticated());

    gated.release.notify_one();
    slow.await.unwrap().unwrap();
    fast.await.unwrap().unwrap();

    assert_eq!(session.get("token"), Some(json!("fast")));
    assert!(same_authenticator(&session.authenticator().unwrap(), &mock.as_dyn()));
}

#[tokio::test]
async fn test_store_update_waits_for_in_flight_transition() {
    let mock = MockAuthenticator::named("mock");
    let gated = Arc::new(GatedAuthenticator::default());
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;

    let slow = tokio::spawn({
        let session = session.clone();
        let gated = gated.clone();
        async move { session.authenticate(gated, token("slow")).await }
    });
    gated.entered.notified().await;

    storage.write_external(props(json!({ "authenticator": "mock", "token": "external" })));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    // Not handled while the authentication is pending.
    assert!(mock.restored().is_empty());
    assert!(!session.is_authenticated());

    gated.release.notify_one();
    slow.await.unwrap().unwrap();
    let state = session.settled().await.unwrap();

    // The authentication finished after the external write, so its record
    // is the latest one and the older notification is dropped.
    assert!(mock.restored().is_empty());
    assert_eq!(state.get("token"), Some(&json!("slow")));
    assert_eq!(state.authenticator_id(), Some(AuthenticatorId::new("gated")));
    assert_eq!(
        storage.snapshot(),
        props(json!({ "authenticator": "gated", "token": "slow" }))
    );
}

#[tokio::test]
async fn test_authenticator_update_applies_after_in_flight_transition() {
    let gated = Arc::new(GatedAuthenticator::default());
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, AuthenticatorRegistry::new()).await;

    let first = tokio::spawn({
        let session = session.clone();
        let gated = gated.clone();
        async move { session.authenticate(gated, token("v1")).await }
    });
    gated.entered.notified().await;
    gated.release.notify_one();
    first.await.unwrap().unwrap();

    let second = tokio::spawn({
        let session = session.clone();
        let gated = gated.clone();
        async move { session.authenticate(gated, token("v2")).await }
    });
    gated.entered.notified().await;

    assert_eq!(gated.events.emit(token("pushed")), 1);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    // Still the content from before the pending authentication.
    assert_eq!(session.get("token"), Some(json!("v1")));

    gated.release.notify_one();
    second.await.unwrap().unwrap();
    session.settled().await.unwrap();

    // Same instance rebound, so the queued update survives and lands last.
    assert_eq!(session.get("token"), Some(json!("pushed")));
    assert_eq!(gated.events.listener_count(), 1);
    assert_eq!(
        storage.snapshot(),
        props(json!({ "authenticator": "gated", "token": "pushed" }))
    );
}

#[tokio::test]
async fn test_watch_fires_on_change_only() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;
    let mut changes = session.watch();

    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();
    assert!(changes.has_changed().unwrap());
    assert!(changes.borrow_and_update().is_authenticated());

    // Same authenticator, same content.
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();
    assert!(!changes.has_changed().unwrap());

    mock.events.emit(token("t2"));
    session.settled().await.unwrap();
    assert!(changes.has_changed().unwrap());
    assert_eq!(changes.borrow_and_update().get("token"), Some(&json!("t2")));
}

#[tokio::test]
async fn test_attempted_transition_is_taken_once() {
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, AuthenticatorRegistry::new()).await;

    session.set_attempted_transition("/admin").await.unwrap();

    assert_eq!(
        session.take_attempted_transition().await.unwrap(),
        Some("/admin".to_owned())
    );
    assert_eq!(session.take_attempted_transition().await.unwrap(), None);
}

#[tokio::test]
async fn test_shutdown_makes_session_unavailable() {
    let mock = MockAuthenticator::named("mock");
    let storage = SharedStorage::new();
    let session = spawn_on(&storage, registry_with(&[&mock])).await;
    session.authenticate(mock.as_dyn(), token("t1")).await.unwrap();

    session.shutdown().await.unwrap();
    let result = session.authenticate(mock.as_dyn(), token("t2")).await;

    assert!(matches!(result, Err(SessionError::Unavailable)));
    assert!(!session.is_running());
    assert_eq!(mock.events.listener_count(), 0);
    // Shutting down isn't invalidating: the record stays for next time.
    assert!(!storage.snapshot().is_empty());
}

// =========================================================================
// Durable store
// =========================================================================

#[tokio::test]
async fn test_file_store_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let mock = MockAuthenticator::named("mock");

    let first = Session::spawn(
        FileStore::new(path.clone()),
        registry_with(&[&mock]),
        SessionConfig::default(),
    );
    first.authenticate(mock.as_dyn(), token("t1")).await.unwrap();
    first.shutdown().await.unwrap();

    let second = Session::spawn(
        FileStore::new(path.clone()),
        registry_with(&[&mock]),
        SessionConfig::default(),
    );
    let state = second.settled().await.unwrap();

    assert!(state.is_authenticated());
    assert_eq!(state.get("token"), Some(&json!("t1")));
}
