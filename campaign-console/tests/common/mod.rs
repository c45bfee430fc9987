#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    response::Response,
    Router,
};
use campaign_console::config::RouteSettings;
use campaign_console::models::{Identity, Role, RoleRecord};
use campaign_console::services::{
    ConsoleMetrics, IdentityEvent, IdentityListeners, IdentityProvider, IdentitySubscription,
    ProviderError, RoleStore,
};
use campaign_console::session::{ProviderFactory, SessionRegistry, SessionResolver, SessionSnapshot};
use campaign_console::AppState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse";

fn open_gate() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(Semaphore::MAX_PERMITS))
}

/// In-memory identity provider with a controllable initial check.
pub struct FakeIdentityProvider {
    listeners: Arc<IdentityListeners>,
    current: Mutex<Option<Identity>>,
    accounts: Mutex<HashMap<String, Identity>>,
    unreachable: AtomicBool,
    fail_sign_out: AtomicBool,
    check_gate: Arc<Semaphore>,
    pub current_calls: AtomicUsize,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self {
            listeners: IdentityListeners::new(),
            current: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            unreachable: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            check_gate: open_gate(),
            current_calls: AtomicUsize::new(0),
        }
    }

    pub fn signed_in(identity: Identity) -> Self {
        let provider = Self::new();
        *provider.current.lock().unwrap() = Some(identity);
        provider
    }

    pub fn unreachable() -> Self {
        let provider = Self::new();
        provider.unreachable.store(true, Ordering::SeqCst);
        provider
    }

    pub fn with_account(self, identity: Identity) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(identity.email.clone(), identity);
        self
    }

    /// Hold the initial identity check until `release_initial_check`.
    pub fn gated(mut self) -> Self {
        self.check_gate = Arc::new(Semaphore::new(0));
        self
    }

    pub fn release_initial_check(&self) {
        self.check_gate.add_permits(1);
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    pub fn emit(&self, event: IdentityEvent) {
        self.listeners.emit(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.subscriber_count()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, ProviderError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.check_gate.acquire().await {
            permit.forget();
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection("connection refused".to_string()));
        }
        Ok(self.current.lock().unwrap().clone())
    }

    fn subscribe(&self) -> IdentitySubscription {
        self.listeners.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        let identity = self.accounts.lock().unwrap().get(email).cloned();
        match identity {
            Some(identity) if password == PASSWORD => {
                *self.current.lock().unwrap() = Some(identity.clone());
                self.listeners.emit(IdentityEvent::SignedIn(identity.clone()));
                Ok(identity)
            }
            _ => Err(ProviderError::Unauthorized(
                "Invalid login credentials".to_string(),
            )),
        }
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 500,
                message: "upstream error".to_string(),
            });
        }
        *self.current.lock().unwrap() = None;
        self.listeners.emit(IdentityEvent::SignedOut);
        Ok(())
    }
}

/// In-memory role table with an optional gate on lookups.
pub struct FakeRoleStore {
    records: Mutex<HashMap<Uuid, RoleRecord>>,
    failing: AtomicBool,
    gate: Arc<Semaphore>,
    pub calls: AtomicUsize,
}

impl FakeRoleStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            gate: open_gate(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_role(self, identity: &Identity, role: Role) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(identity.id, RoleRecord::new(identity.id, role));
        self
    }

    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    /// Hold every lookup until `release` hands out a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Arc::new(Semaphore::new(0));
        self
    }

    pub fn release(&self, lookups: usize) {
        self.gate.add_permits(lookups);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleStore for FakeRoleStore {
    async fn role_record(&self, identity_id: Uuid) -> Result<Option<RoleRecord>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Connection("role store unreachable".to_string()));
        }
        Ok(self.records.lock().unwrap().get(&identity_id).cloned())
    }
}

pub fn staff(email: &str) -> Identity {
    Identity::new(Uuid::new_v4(), email)
}

pub fn resolver(provider: &Arc<FakeIdentityProvider>, store: &Arc<FakeRoleStore>) -> SessionResolver {
    SessionResolver::new(provider.clone(), store.clone())
}

/// Wait (bounded) for a snapshot matching `predicate`.
pub async fn wait_until<F>(resolver: &SessionResolver, predicate: F) -> Arc<SessionSnapshot>
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let mut rx = resolver.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for session snapshot")
        .expect("session writer stopped")
        .clone();
    snapshot
}

/// Let spawned tasks run without waiting on a specific state.
pub async fn settle_tasks() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Hands every browser session its own fake provider over a shared set of
/// accounts.
pub struct FakeProviders {
    accounts: Vec<Identity>,
    created: Mutex<Vec<Arc<FakeIdentityProvider>>>,
    fail_sign_out: AtomicBool,
}

impl FakeProviders {
    pub fn with_accounts(accounts: impl IntoIterator<Item = Identity>) -> Arc<Self> {
        Arc::new(Self {
            accounts: accounts.into_iter().collect(),
            created: Mutex::new(Vec::new()),
            fail_sign_out: AtomicBool::new(false),
        })
    }

    pub fn factory(self: &Arc<Self>) -> ProviderFactory {
        let providers = self.clone();
        Arc::new(move || -> Arc<dyn IdentityProvider> { providers.create() })
    }

    fn create(&self) -> Arc<FakeIdentityProvider> {
        let provider = self
            .accounts
            .iter()
            .cloned()
            .fold(FakeIdentityProvider::new(), FakeIdentityProvider::with_account);
        provider.fail_sign_out(self.fail_sign_out.load(Ordering::SeqCst));

        let provider = Arc::new(provider);
        self.created.lock().unwrap().push(provider.clone());
        provider
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
        for provider in self.created.lock().unwrap().iter() {
            provider.fail_sign_out(fail);
        }
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

pub fn registry(providers: &Arc<FakeProviders>, store: &Arc<FakeRoleStore>) -> SessionRegistry {
    SessionRegistry::new(providers.factory(), store.clone())
}

pub fn app_state(sessions: SessionRegistry) -> AppState {
    let metrics = ConsoleMetrics::new().expect("metrics registry");
    AppState::new(sessions, metrics, RouteSettings::default())
}

/// Router client that carries its session cookie between requests.
pub struct Browser {
    app: Router,
    cookie: Option<String>,
}

impl Browser {
    pub fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    pub fn has_cookie(&self) -> bool {
        self.cookie.is_some()
    }

    pub async fn send(&mut self, mut request: Request<Body>) -> Response {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }

        let response = self.app.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            // An empty value is the layer deleting the cookie.
            self.cookie = set_cookie
                .split(';')
                .next()
                .filter(|pair| !pair.ends_with('='))
                .map(str::to_string);
        }
        response
    }

    pub async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&mut self, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Response {
        let body = format!("email={}&password={}", email.replace('@', "%40"), password);
        self.send(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// This browser's `/session` document.
    pub async fn session(&mut self) -> serde_json::Value {
        let response = self.get("/session").await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Poll `/session` until the snapshot is no longer loading.
    pub async fn settle(&mut self) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let session = self.session().await;
                if session["is_loading"] == false {
                    return session;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for the browser session to settle")
    }
}
