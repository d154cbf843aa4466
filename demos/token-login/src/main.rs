use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use latchkey::prelude::*;
use rand::Rng;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Token authenticator
// ---------------------------------------------------------------------------

/// Stands in for a token endpoint: one account, tokens kept in memory.
struct TokenAuthenticator {
    issued: Mutex<HashSet<String>>,
    events: SessionEvents,
}

impl TokenAuthenticator {
    fn new() -> Self {
        Self {
            issued: Mutex::new(HashSet::new()),
            events: SessionEvents::new(),
        }
    }

    fn issue(&self, user: &str) -> Properties {
        let token = generate_token();
        if let Ok(mut issued) = self.issued.lock() {
            issued.insert(token.clone());
        }
        props(json!({ "user": user, "token": token }))
    }

    fn is_valid(&self, token: &str) -> bool {
        self.issued.lock().map(|issued| issued.contains(token)).unwrap_or(false)
    }

    /// Swaps the token behind the session's back, like a background refresh.
    fn refresh(&self, user: &str) -> usize {
        self.events.emit(self.issue(user))
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    fn id(&self) -> AuthenticatorId {
        AuthenticatorId::new("token")
    }

    async fn restore(&self, properties: Properties) -> Result<Properties, AuthenticatorError> {
        match properties.get("token").and_then(Value::as_str) {
            Some(token) if self.is_valid(token) => Ok(properties),
            _ => Err(AuthenticatorError::rejected("token unknown or revoked")),
        }
    }

    async fn authenticate(&self, options: Properties) -> Result<Properties, AuthenticatorError> {
        let user = options.get("user").and_then(Value::as_str);
        let password = options.get("password").and_then(Value::as_str);
        match (user, password) {
            (Some(user), Some("correct horse")) => Ok(self.issue(user)),
            _ => Err(AuthenticatorError::rejected("invalid credentials")),
        }
    }

    async fn invalidate(&self, content: &Properties) -> Result<(), AuthenticatorError> {
        if let (Some(token), Ok(mut issued)) =
            (content.get("token").and_then(Value::as_str), self.issued.lock())
        {
            issued.remove(token);
        }
        Ok(())
    }

    fn session_events(&self) -> Option<&SessionEvents> {
        Some(&self.events)
    }
}

/// Random 32-character hex token.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

fn describe(name: &str, state: &SessionState) {
    match state.get("token").and_then(Value::as_str) {
        Some(token) => println!("  {name}: {state}, token {token}"),
        None => println!("  {name}: {state}"),
    }
}

// ---------------------------------------------------------------------------
// Two tabs, one storage
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), LatchkeyError> {
    latchkey::logging::init();

    let authenticator = Arc::new(TokenAuthenticator::new());
    let registry = AuthenticatorRegistry::new().with(authenticator.clone());
    let storage = SharedStorage::new();

    let tab_a = SessionBuilder::new().start(storage.open(), registry.clone());
    let tab_b = SessionBuilder::new().start(storage.open(), registry);
    tab_a.settled().await?;
    tab_b.settled().await?;

    println!("wrong password in tab A:");
    let wrong = props(json!({ "user": "ada", "password": "hunter2" }));
    if let Err(error) = tab_a.authenticate(authenticator.clone(), wrong).await {
        println!("  rejected: {error}");
    }

    println!("login in tab A:");
    let right = props(json!({ "user": "ada", "password": "correct horse" }));
    tab_a.authenticate(authenticator.clone(), right).await?;
    describe("tab A", &tab_a.settled().await?);
    describe("tab B", &tab_b.settled().await?);

    println!("token refresh:");
    let delivered = authenticator.refresh("ada");
    tracing::info!(delivered, "refreshed token pushed");
    describe("tab A", &tab_a.settled().await?);
    describe("tab B", &tab_b.settled().await?);

    println!("logout in tab B:");
    tab_b.invalidate().await?;
    describe("tab A", &tab_a.settled().await?);
    describe("tab B", &tab_b.settled().await?);

    tab_a.shutdown().await?;
    tab_b.shutdown().await?;
    Ok(())
}
