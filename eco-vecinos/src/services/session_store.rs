//! Per-browser session state.
//!
//! A [`SessionStore`] moves through
//! `Uninitialized -> Resolving -> {Authenticated, Anonymous}` and back to
//! `Anonymous` on sign-out. Every resolution runs under a [`Ticket`]; results
//! carrying a ticket older than the store's current generation are dropped, so
//! a slow lookup can never overwrite a newer sign-in or sign-out. A ticket
//! dropped without completing (the request was cancelled) settles the store
//! to `Anonymous`.

use crate::models::Identity;
use crate::services::backend::{AuthChange, ProviderSession};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Resolving,
    Authenticated(Identity),
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub generation: u64,
    credential: Option<ProviderSession>,
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match &self.phase {
            SessionPhase::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Uninitialized | SessionPhase::Resolving
        )
    }
}

/// Proof that a resolution was started at a given generation.
#[must_use = "dropping a ticket abandons the resolution"]
pub struct Ticket<'a> {
    store: &'a SessionStore,
    generation: u64,
    settled: bool,
}

impl Ticket<'_> {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.store.abandon(self.generation);
        }
    }
}

pub struct SessionStore {
    state: watch::Sender<SessionState>,
    last_used: Mutex<Instant>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState {
            phase: SessionPhase::Uninitialized,
            generation: 0,
            credential: None,
        });
        Self {
            state,
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    pub fn credential(&self) -> Option<ProviderSession> {
        self.state.borrow().credential.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_current(&self, ticket: &Ticket<'_>) -> bool {
        self.state.borrow().generation == ticket.generation
    }

    /// Nothing to resolve and nobody signed in.
    pub fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        state.credential.is_none()
            && matches!(
                state.phase,
                SessionPhase::Uninitialized | SessionPhase::Anonymous
            )
    }

    fn touch(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last_used| last_used.elapsed())
            .unwrap_or_default()
    }

    /// Start a resolution. Any ticket handed out earlier becomes stale.
    pub fn begin_resolution(&self) -> Ticket<'_> {
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.phase = SessionPhase::Resolving;
            generation = state.generation;
        });
        Ticket {
            store: self,
            generation,
            settled: false,
        }
    }

    /// Store the provider credential obtained under `ticket`.
    pub fn attach_credential(&self, ticket: &Ticket<'_>, credential: ProviderSession) -> bool {
        self.state.send_if_modified(|state| {
            if state.generation != ticket.generation {
                return false;
            }
            state.credential = Some(credential);
            true
        })
    }

    /// Apply the outcome of a resolution. Returns `false` when the ticket is
    /// stale, in which case nothing changes.
    pub fn complete(&self, mut ticket: Ticket<'_>, identity: Option<Identity>) -> bool {
        ticket.settled = true;
        self.state.send_if_modified(|state| {
            if state.generation != ticket.generation {
                return false;
            }
            state.phase = match identity {
                Some(identity) => SessionPhase::Authenticated(identity),
                None => {
                    state.credential = None;
                    SessionPhase::Anonymous
                }
            };
            true
        })
    }

    /// A resolution under `generation` will never complete. The credential,
    /// if one was attached, is kept so a later login or logout can use it.
    fn abandon(&self, generation: u64) {
        let abandoned = self.state.send_if_modified(|state| {
            if state.generation != generation || !state.is_loading() {
                return false;
            }
            state.phase = SessionPhase::Anonymous;
            true
        });
        if abandoned {
            tracing::warn!(generation, "Session resolution abandoned");
        }
    }

    /// Drop to `Anonymous` immediately and hand back the credential, if any,
    /// for the caller to revoke remotely.
    pub fn sign_out(&self) -> Option<ProviderSession> {
        let mut credential = None;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.phase = SessionPhase::Anonymous;
            credential = state.credential.take();
        });
        credential
    }

    /// Whether a provider-side change invalidates this store.
    fn is_affected_by(&self, change: &AuthChange) -> bool {
        let state = self.state.borrow();
        match change {
            AuthChange::SessionRevoked { session_id } => state
                .credential
                .as_ref()
                .is_some_and(|credential| &credential.id == session_id),
            AuthChange::PrincipalRevoked { principal_id } => state
                .identity()
                .is_some_and(|identity| &identity.id == principal_id),
        }
    }
}

/// Every live browser session's store, keyed by the client key kept in the
/// session cookie.
#[derive(Default)]
pub struct SessionRegistry {
    stores: DashMap<Uuid, Arc<SessionStore>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Uuid) -> Option<Arc<SessionStore>> {
        let store = self.stores.get(key).map(|store| store.clone())?;
        store.touch();
        Some(store)
    }

    pub fn get_or_create(&self, key: Uuid) -> Arc<SessionStore> {
        let store = self
            .stores
            .entry(key)
            .or_insert_with(|| Arc::new(SessionStore::new()))
            .clone();
        store.touch();
        store
    }

    pub fn remove(&self, key: &Uuid) -> Option<Arc<SessionStore>> {
        self.stores.remove(key).map(|(_, store)| store)
    }

    /// Drop the store under `key` if it holds nothing. Returns whether it went.
    pub fn remove_if_idle(&self, key: &Uuid) -> bool {
        self.stores
            .remove_if(key, |_, store| store.is_idle())
            .is_some()
    }

    /// Forget idle stores and any store unused for longer than `max_unused`.
    /// Returns how many were dropped.
    pub fn evict_stale(&self, max_unused: Duration) -> usize {
        let before = self.stores.len();
        self.stores
            .retain(|_, store| !store.is_idle() && store.idle_for() < max_unused);
        before.saturating_sub(self.stores.len())
    }

    /// Periodically evict stale stores, matching the browser session lifetime.
    pub fn spawn_sweeper(self: Arc<Self>, max_unused: Duration) -> JoinHandle<()> {
        let period = (max_unused / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = self.evict_stale(max_unused);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = self.len(), "Evicted stale sessions");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Sign out every store the change applies to. Returns how many changed.
    pub fn apply(&self, change: &AuthChange) -> usize {
        let affected: Vec<Arc<SessionStore>> = self
            .stores
            .iter()
            .filter(|entry| entry.value().is_affected_by(change))
            .map(|entry| entry.value().clone())
            .collect();

        for store in &affected {
            store.sign_out();
        }
        affected.len()
    }

    /// Forward provider auth changes into the registry until the feed closes.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut changes: broadcast::Receiver<AuthChange>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let affected = self.apply(&change);
                        tracing::info!(?change, affected, "Applied provider auth change");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth change feed closed");
        })
    }
}
