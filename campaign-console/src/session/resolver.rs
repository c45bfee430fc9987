//! Session resolver: the single writer of one browser session's snapshot.
//!
//! Provider events, the startup identity check and role lookup results are
//! all funnelled through one command channel into a writer task, which owns
//! the `watch` sender. Everything else reads.

use prometheus::IntCounterVec;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use super::SessionSnapshot;
use crate::models::{Identity, RoleRecord};
use crate::services::{IdentityEvent, IdentityProvider, IdentitySubscription, ProviderError, RoleStore};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session resolver already initialized")]
    AlreadyInitialized,

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(#[source] ProviderError),

    #[error("Sign-in failed: {0}")]
    SignIn(#[source] ProviderError),

    #[error("Sign-out failed: {0}")]
    SignOut(#[source] ProviderError),

    #[error("Initial identity check cancelled by shutdown")]
    Cancelled,

    #[error("Session store error: {0}")]
    Store(#[from] tower_sessions::session::Error),
}

enum Command {
    Identity(IdentityEvent),
    InitialCheckFailed,
    RoleSettled {
        generation: u64,
        identity: Identity,
        result: Result<Option<RoleRecord>, ProviderError>,
    },
}

/// Outcome of the startup identity check started by `initialize`.
pub struct InitialCheck {
    outcome: oneshot::Receiver<Result<(), SessionError>>,
}

impl InitialCheck {
    /// Resolves once the check has returned. A provider failure comes back
    /// as `Err`; the snapshot has already settled as signed out by then.
    /// A check aborted by `shutdown` reports `SessionError::Cancelled`.
    pub async fn wait(self) -> Result<(), SessionError> {
        self.outcome.await.unwrap_or(Err(SessionError::Cancelled))
    }
}

pub struct SessionResolver {
    identity_provider: Arc<dyn IdentityProvider>,
    role_store: Arc<dyn RoleStore>,
    snapshot_rx: watch::Receiver<Arc<SessionSnapshot>>,
    pending_writer: Mutex<Option<watch::Sender<Arc<SessionSnapshot>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    lookup_counter: Option<IntCounterVec>,
}

impl SessionResolver {
    pub fn new(identity_provider: Arc<dyn IdentityProvider>, role_store: Arc<dyn RoleStore>) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(SessionSnapshot::loading()));
        Self {
            identity_provider,
            role_store,
            snapshot_rx,
            pending_writer: Mutex::new(Some(snapshot_tx)),
            tasks: Mutex::new(Vec::new()),
            lookup_counter: None,
        }
    }

    /// Count role lookups by result (`found`, `missing`, `error`).
    pub fn with_lookup_counter(mut self, counter: IntCounterVec) -> Self {
        self.lookup_counter = Some(counter);
        self
    }

    /// Subscribe to provider events and start the one-shot identity check.
    ///
    /// Must be called from within a tokio runtime, once.
    pub fn initialize(&self) -> Result<InitialCheck, SessionError> {
        let snapshot_tx = self
            .pending_writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SessionError::AlreadyInitialized)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let writer = SnapshotWriter {
            snapshot_tx,
            commands: command_tx.downgrade(),
            role_store: self.role_store.clone(),
            lookup_counter: self.lookup_counter.clone(),
            generation: 0,
            in_flight: None,
            explicit_event_seen: false,
        };

        let subscription = self.identity_provider.subscribe();
        let (done_tx, done_rx) = oneshot::channel();
        let provider = self.identity_provider.clone();
        let check_tx = command_tx.clone();

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(tokio::spawn(writer.run(command_rx)));
        tasks.push(tokio::spawn(forward_events(subscription, command_tx)));
        tasks.push(tokio::spawn(async move {
            tracing::debug!("Performing initial identity check");
            let outcome = match provider.current_identity().await {
                Ok(identity) => {
                    let _ = check_tx.send(Command::Identity(IdentityEvent::InitialStateDetected(
                        identity,
                    )));
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Initial identity check failed");
                    let _ = check_tx.send(Command::InitialCheckFailed);
                    Err(SessionError::ProviderUnavailable(e))
                }
            };
            let _ = done_tx.send(outcome);
        }));

        Ok(InitialCheck { outcome: done_rx })
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Wait until the snapshot is no longer loading.
    pub async fn settled(&self) -> Arc<SessionSnapshot> {
        let mut rx = self.snapshot_rx.clone();
        let settled = match rx.wait_for(|snapshot| !snapshot.is_loading).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    /// Wait until the writer has applied a sign-in for `identity_id`.
    /// Returns false if the writer stopped first.
    pub async fn wait_for_identity(&self, identity_id: Uuid) -> bool {
        let mut rx = self.snapshot_rx.clone();
        let seen = rx
            .wait_for(|snapshot| snapshot.identity.as_ref().map(|i| i.id) == Some(identity_id))
            .await
            .is_ok();
        seen
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        self.identity_provider
            .sign_in_with_password(email, password)
            .await
            .map_err(SessionError::SignIn)
    }

    /// Ask the provider to end the session. The snapshot is cleared by the
    /// provider's `SignedOut` event, never here.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.identity_provider.sign_out().await.map_err(|e| {
            tracing::warn!(error = %e, "Sign-out failed, keeping current session");
            SessionError::SignOut(e)
        })
    }

    /// Stop the writer and drop any lookup still in flight.
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn forward_events(mut subscription: IdentitySubscription, commands: mpsc::UnboundedSender<Command>) {
    while let Some(event) = subscription.recv().await {
        tracing::debug!(?event, "Identity event received");
        if commands.send(Command::Identity(event)).is_err() {
            break;
        }
    }
    subscription.unsubscribe();
}

struct InFlight {
    identity_id: Uuid,
    handle: AbortHandle,
}

struct SnapshotWriter {
    snapshot_tx: watch::Sender<Arc<SessionSnapshot>>,
    commands: mpsc::WeakUnboundedSender<Command>,
    role_store: Arc<dyn RoleStore>,
    lookup_counter: Option<IntCounterVec>,
    /// Bumped on every identity change; role results from older generations are dropped.
    generation: u64,
    in_flight: Option<InFlight>,
    explicit_event_seen: bool,
}

impl SnapshotWriter {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Identity(event) => self.on_identity_event(event),
                Command::InitialCheckFailed => self.on_initial_check_failed(),
                Command::RoleSettled {
                    generation,
                    identity,
                    result,
                } => self.on_role_settled(generation, identity, result),
            }
        }
        tracing::debug!("Session writer stopped");
    }

    fn current(&self) -> Arc<SessionSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    fn publish(&self, next: SessionSnapshot) {
        self.snapshot_tx.send_if_modified(|current| {
            if **current == next {
                return false;
            }
            *current = Arc::new(next);
            true
        });
    }

    fn on_identity_event(&mut self, event: IdentityEvent) {
        match event {
            IdentityEvent::SignedIn(identity) => {
                self.explicit_event_seen = true;
                self.begin_resolution(identity);
            }
            IdentityEvent::InitialStateDetected(identity) => {
                if self.explicit_event_seen {
                    tracing::debug!("Ignoring initial state reported after a sign-in change");
                    return;
                }
                match identity {
                    Some(identity) => self.begin_resolution(identity),
                    None => self.settle_signed_out(),
                }
            }
            IdentityEvent::SignedOut => {
                self.explicit_event_seen = true;
                self.settle_signed_out();
            }
        }
    }

    fn on_initial_check_failed(&mut self) {
        let current = self.current();
        if current.is_loading && current.identity.is_none() && self.in_flight.is_none() {
            tracing::warn!("Treating unreachable identity provider as signed out");
            self.settle_signed_out();
        }
    }

    fn begin_resolution(&mut self, identity: Identity) {
        if let Some(in_flight) = &self.in_flight {
            if in_flight.identity_id == identity.id {
                tracing::debug!(identity_id = %identity.id, "Role lookup already in flight");
                return;
            }
        }

        self.generation += 1;
        self.abort_in_flight();

        let current = self.current();
        let already_resolved = !current.is_loading && current.identity.as_ref() == Some(&identity);
        if !already_resolved {
            self.publish(SessionSnapshot::resolving(identity.clone()));
        }

        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        let store = self.role_store.clone();
        let generation = self.generation;
        let identity_id = identity.id;

        tracing::debug!(identity_id = %identity_id, generation, "Looking up role record");
        let task = tokio::spawn(async move {
            let result = store.role_record(identity.id).await;
            let _ = commands.send(Command::RoleSettled {
                generation,
                identity,
                result,
            });
        });

        self.in_flight = Some(InFlight {
            identity_id,
            handle: task.abort_handle(),
        });
    }

    fn on_role_settled(
        &mut self,
        generation: u64,
        identity: Identity,
        result: Result<Option<RoleRecord>, ProviderError>,
    ) {
        if generation != self.generation {
            tracing::debug!(identity_id = %identity.id, generation, "Dropping stale role lookup");
            return;
        }
        self.in_flight = None;

        let role = match result {
            Ok(Some(record)) => {
                self.count_lookup("found");
                tracing::info!(identity_id = %identity.id, role = %record.role, "Role resolved");
                Some(record)
            }
            Ok(None) => {
                self.count_lookup("missing");
                tracing::warn!(identity_id = %identity.id, "No role record for identity");
                None
            }
            Err(e) => {
                self.count_lookup("error");
                tracing::warn!(identity_id = %identity.id, error = %e, "Role lookup failed");
                None
            }
        };

        self.publish(SessionSnapshot::resolved(identity, role));
    }

    fn settle_signed_out(&mut self) {
        self.generation += 1;
        self.abort_in_flight();
        self.publish(SessionSnapshot::signed_out());
    }

    fn abort_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
    }

    fn count_lookup(&self, result: &str) {
        if let Some(counter) = &self.lookup_counter {
            counter.with_label_values(&[result]).inc();
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}
