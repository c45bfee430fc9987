//! Per-browser session resolvers.
//!
//! Each browser's cookie session carries an opaque key. The key maps to a
//! `SessionResolver` with its own identity provider session, so one sign-in
//! never authorizes another browser. Requests without a key see a settled
//! signed-out snapshot.

use dashmap::DashMap;
use prometheus::IntCounterVec;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tower_sessions::Session;
use uuid::Uuid;

use super::{SessionError, SessionResolver, SessionSnapshot};
use crate::services::{IdentityProvider, RoleStore};

/// Cookie-session field holding the registry key.
pub const SESSION_KEY: &str = "console_session";

/// Builds a fresh identity provider for a new browser session.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn IdentityProvider> + Send + Sync>;

struct Entry {
    resolver: Arc<SessionResolver>,
    last_seen: Mutex<Instant>,
}

impl Entry {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    providers: ProviderFactory,
    role_store: Arc<dyn RoleStore>,
    lookup_counter: Option<IntCounterVec>,
    resolvers: Arc<DashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new(providers: ProviderFactory, role_store: Arc<dyn RoleStore>) -> Self {
        Self {
            providers,
            role_store,
            lookup_counter: None,
            resolvers: Arc::new(DashMap::new()),
        }
    }

    /// Attach the role lookup counter to every resolver created from now on.
    pub fn with_lookup_counter(mut self, counter: IntCounterVec) -> Self {
        self.lookup_counter = Some(counter);
        self
    }

    /// Resolver bound to this browser, if it has signed in before.
    pub async fn resolver(
        &self,
        session: &Session,
    ) -> Result<Option<Arc<SessionResolver>>, SessionError> {
        let Some(key) = session.get::<Uuid>(SESSION_KEY).await? else {
            return Ok(None);
        };
        Ok(self.resolvers.get(&key).map(|entry| {
            entry.touch();
            entry.resolver.clone()
        }))
    }

    /// Current snapshot for this browser. Browsers without a resolver are
    /// signed out.
    pub async fn snapshot(&self, session: &Session) -> Result<Arc<SessionSnapshot>, SessionError> {
        Ok(match self.resolver(session).await? {
            Some(resolver) => resolver.snapshot(),
            None => Arc::new(SessionSnapshot::signed_out()),
        })
    }

    /// Resolver for this browser, creating and initializing one on first use.
    pub async fn get_or_create(&self, session: &Session) -> Result<Arc<SessionResolver>, SessionError> {
        if let Some(resolver) = self.resolver(session).await? {
            return Ok(resolver);
        }

        let mut resolver = SessionResolver::new((self.providers)(), self.role_store.clone());
        if let Some(counter) = &self.lookup_counter {
            resolver = resolver.with_lookup_counter(counter.clone());
        }
        let resolver = Arc::new(resolver);

        let initial_check = resolver.initialize()?;
        tokio::spawn(async move {
            match initial_check.wait().await {
                Ok(()) | Err(SessionError::Cancelled) => {}
                Err(e) => tracing::warn!(error = %e, "Identity provider unreachable, session starts signed out"),
            }
        });

        let key = Uuid::new_v4();
        session.insert(SESSION_KEY, key).await?;
        self.resolvers.insert(
            key,
            Entry {
                resolver: resolver.clone(),
                last_seen: Mutex::new(Instant::now()),
            },
        );
        tracing::debug!(sessions = self.resolvers.len(), "Browser session started");

        Ok(resolver)
    }

    /// Drop this browser's resolver and its cookie session.
    pub async fn end(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(key) = session.get::<Uuid>(SESSION_KEY).await? {
            if let Some((_, entry)) = self.resolvers.remove(&key) {
                entry.resolver.shutdown();
            }
        }
        session.flush().await?;
        Ok(())
    }

    /// Shut down resolvers whose browser has been idle for `max_idle`.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let before = self.resolvers.len();
        self.resolvers.retain(|_, entry| {
            let keep = entry.idle_for() < max_idle;
            if !keep {
                entry.resolver.shutdown();
            }
            keep
        });
        before.saturating_sub(self.resolvers.len())
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn shutdown(&self) {
        for entry in self.resolvers.iter() {
            entry.resolver.shutdown();
        }
        self.resolvers.clear();
    }
}
