//! Identity provider contract and its GoTrue-style HTTP adapter.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::ProviderError;
use crate::config::IdentityProviderSettings;
use crate::models::Identity;

/// Sign-in state changes pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(Identity),
    /// First state observed for this process; `None` means nobody is signed in.
    InitialStateDetected(Option<Identity>),
    SignedOut,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// One-shot check of who is currently signed in.
    async fn current_identity(&self) -> Result<Option<Identity>, ProviderError>;

    /// Register for state-change events. Dropping the handle unsubscribes.
    fn subscribe(&self) -> IdentitySubscription;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError>;

    /// Ends the provider session. Local state follows from the `SignedOut`
    /// event, not from this call returning.
    async fn sign_out(&self) -> Result<(), ProviderError>;
}

/// Fan-out of identity events to live subscriptions.
#[derive(Default)]
pub struct IdentityListeners {
    next_id: AtomicU64,
    senders: DashMap<u64, mpsc::UnboundedSender<IdentityEvent>>,
}

impl IdentityListeners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>) -> IdentitySubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(id, tx);

        IdentitySubscription {
            id,
            events: rx,
            listeners: Arc::downgrade(self),
        }
    }

    pub fn emit(&self, event: IdentityEvent) {
        self.senders
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }

    fn remove(&self, id: u64) {
        self.senders.remove(&id);
    }
}

/// Live registration with an identity provider.
pub struct IdentitySubscription {
    id: u64,
    events: mpsc::UnboundedReceiver<IdentityEvent>,
    listeners: Weak<IdentityListeners>,
}

impl IdentitySubscription {
    /// Next event, or `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<IdentityEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for IdentitySubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserPayload> for Identity {
    fn from(user: UserPayload) -> Self {
        Identity::new(user.id, user.email.unwrap_or_default())
    }
}

struct HeldSession {
    access_token: Secret<String>,
    identity: Identity,
}

/// Password-grant client for a GoTrue-compatible auth endpoint.
///
/// Holds at most one provider session. The console creates one instance per
/// browser session.
pub struct HttpIdentityProvider {
    client: Client,
    settings: IdentityProviderSettings,
    session: RwLock<Option<HeldSession>>,
    listeners: Arc<IdentityListeners>,
}

impl HttpIdentityProvider {
    pub fn new(settings: IdentityProviderSettings) -> Self {
        Self::with_client(Client::new(), settings)
    }

    /// Share one connection pool across providers.
    pub fn with_client(client: Client, settings: IdentityProviderSettings) -> Self {
        Self {
            client,
            settings,
            session: RwLock::new(None),
            listeners: IdentityListeners::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.auth_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> &str {
        self.settings.anon_key.expose_secret()
    }

    async fn held_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.expose_secret().clone())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, ProviderError> {
        let Some(token) = self.held_token().await else {
            return Ok(None);
        };

        let response = self
            .client
            .traced_get(&self.url("/user"))
            .header("apikey", self.api_key())
            .bearer_auth(&token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let user: UserPayload = response.json().await?;
                Ok(Some(user.into()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::info!("Held session rejected by identity provider, dropping it");
                *self.session.write().await = None;
                Ok(None)
            }
            _ => Err(ProviderError::from_response(response).await),
        }
    }

    fn subscribe(&self) -> IdentitySubscription {
        self.listeners.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        let response = self
            .client
            .traced_post(&self.url("/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", self.api_key())
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(ProviderError::Unauthorized(
                    "Invalid login credentials".to_string(),
                ));
            }
            _ => return Err(ProviderError::from_response(response).await),
        }

        let tokens: TokenResponse = response.json().await?;
        let identity: Identity = tokens.user.into();

        *self.session.write().await = Some(HeldSession {
            access_token: Secret::new(tokens.access_token),
            identity: identity.clone(),
        });

        tracing::info!(identity_id = %identity.id, "Signed in with password");
        self.listeners
            .emit(IdentityEvent::SignedIn(identity.clone()));

        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if let Some(token) = self.held_token().await {
            let response = self
                .client
                .traced_post(&self.url("/logout"))
                .header("apikey", self.api_key())
                .bearer_auth(&token)
                .send()
                .await?;

            // 401 means the token already expired; the session is gone either way.
            let status = response.status();
            if !status.is_success() && status != StatusCode::UNAUTHORIZED {
                return Err(ProviderError::from_response(response).await);
            }

            if let Some(ended) = self.session.write().await.take() {
                tracing::info!(identity_id = %ended.identity.id, "Signed out");
            }
        }

        self.listeners.emit(IdentityEvent::SignedOut);
        Ok(())
    }
}
