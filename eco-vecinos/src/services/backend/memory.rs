//! Process-local backend implementing both capabilities.
//!
//! Used for local development and by the test-suite. It mirrors the hosted
//! provider's observable behaviour: session reuse is refused while a session
//! is live, login attempts are rate limited per email, and revocations are
//! pushed to subscribers.

use super::{
    unique_id, AuthChange, BackendError, BackendErrorKind, DocumentStore, IdentityProvider,
    ProviderSession,
};
use crate::models::{to_fields, Collection, Document, ListQuery, Principal, Profile, SortKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::broadcast;

const LOGIN_ATTEMPTS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => unreachable!(),
};

struct Account {
    principal: Principal,
    password: Secret<String>,
}

struct StoredSession {
    principal_id: String,
    secret: Secret<String>,
}

pub struct InMemoryBackend {
    /// Keyed by lower-cased email.
    accounts: DashMap<String, Account>,
    sessions: DashMap<String, StoredSession>,
    documents: DashMap<(Collection, String), Document>,
    login_limiter: DefaultKeyedRateLimiter<String>,
    changes: broadcast::Sender<AuthChange>,
    /// Last issued creation timestamp, in microseconds.
    clock: AtomicI64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            accounts: DashMap::new(),
            sessions: DashMap::new(),
            documents: DashMap::new(),
            login_limiter: RateLimiter::keyed(Quota::per_minute(LOGIN_ATTEMPTS_PER_MINUTE)),
            changes,
            clock: AtomicI64::new(0),
        }
    }

    /// Strictly increasing creation times so newest-first ordering is total.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        let issued = now.max(previous + 1);
        DateTime::from_timestamp_micros(issued).unwrap_or_else(Utc::now)
    }

    /// Create an account together with its co-identified profile document.
    pub async fn seed_user(
        &self,
        email: &str,
        password: &str,
        profile: Profile,
    ) -> Result<Principal, BackendError> {
        let principal = self
            .create_account(&unique_id(), email, password, &profile.name)
            .await?;

        let fields = to_fields(&profile).map_err(|e| BackendError::provider(e.to_string()))?;
        self.create_document(Collection::Users, &principal.id, fields)
            .await?;

        Ok(principal)
    }

    /// Drop every live session of a principal and notify subscribers.
    pub fn revoke_principal(&self, principal_id: &str) {
        self.sessions
            .retain(|_, session| session.principal_id != principal_id);
        let _ = self.changes.send(AuthChange::PrincipalRevoked {
            principal_id: principal_id.to_string(),
        });
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        self.documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .count()
    }

    fn session_is_live(&self, session: &ProviderSession) -> bool {
        self.sessions
            .get(&session.id)
            .map(|stored| stored.secret.expose_secret() == session.secret.expose_secret())
            .unwrap_or(false)
    }
}

fn field_matches(document: &Document, field: &str, expected: &str) -> bool {
    match document.fields.get(field) {
        Some(Value::String(value)) => value == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == expected,
    }
}

#[async_trait]
impl IdentityProvider for InMemoryBackend {
    async fn current_principal(
        &self,
        session: &ProviderSession,
    ) -> Result<Option<Principal>, BackendError> {
        if !self.session_is_live(session) {
            return Ok(None);
        }

        let principal_id = match self.sessions.get(&session.id) {
            Some(stored) => stored.principal_id.clone(),
            None => return Ok(None),
        };

        Ok(self
            .accounts
            .iter()
            .find(|account| account.principal.id == principal_id)
            .map(|account| account.principal.clone()))
    }

    async fn create_session(
        &self,
        active: Option<&ProviderSession>,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, BackendError> {
        let key = email.trim().to_lowercase();

        if self.login_limiter.check_key(&key).is_err() {
            return Err(BackendError::new(
                BackendErrorKind::RateLimited,
                "Rate limit for the current endpoint has been exceeded",
            ));
        }

        if let Some(active) = active {
            if self.session_is_live(active) {
                return Err(BackendError::new(
                    BackendErrorKind::SessionAlreadyActive,
                    "Creation of a session is prohibited when a session is active",
                ));
            }
        }

        let principal_id = match self.accounts.get(&key) {
            Some(account) if account.password.expose_secret() == password => {
                account.principal.id.clone()
            }
            _ => {
                return Err(BackendError::new(
                    BackendErrorKind::InvalidCredentials,
                    "Invalid credentials",
                ))
            }
        };

        let session = ProviderSession {
            id: unique_id(),
            secret: Secret::new(uuid::Uuid::new_v4().to_string()),
        };
        self.sessions.insert(
            session.id.clone(),
            StoredSession {
                principal_id,
                secret: session.secret.clone(),
            },
        );

        Ok(session)
    }

    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Principal, BackendError> {
        let key = email.trim().to_lowercase();

        if self.accounts.iter().any(|account| account.principal.id == id) {
            return Err(BackendError::new(
                BackendErrorKind::Conflict,
                "A user with the same id already exists",
            ));
        }

        let principal = Principal {
            id: id.to_string(),
            email: email.trim().to_string(),
            name: name.to_string(),
        };

        match self.accounts.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BackendError::new(
                BackendErrorKind::Conflict,
                "A user with the same email already exists",
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Account {
                    principal: principal.clone(),
                    password: Secret::new(password.to_string()),
                });
                Ok(principal)
            }
        }
    }

    async fn delete_session(&self, session: &ProviderSession) -> Result<(), BackendError> {
        if !self.session_is_live(session) {
            return Err(BackendError::new(
                BackendErrorKind::Unauthorized,
                "No active session",
            ));
        }
        self.sessions.remove(&session.id);
        let _ = self.changes.send(AuthChange::SessionRevoked {
            session_id: session.id.clone(),
        });
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AuthChange>> {
        Some(self.changes.subscribe())
    }
}

#[async_trait]
impl DocumentStore for InMemoryBackend {
    async fn get_document(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Document, BackendError> {
        self.documents
            .get(&(collection, id.to_string()))
            .map(|doc| doc.clone())
            .ok_or_else(|| {
                BackendError::not_found(format!("Document {} not found in {}", id, collection))
            })
    }

    async fn create_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        let document = Document {
            id: id.to_string(),
            created_at: self.next_timestamp(),
            fields,
        };

        match self.documents.entry((collection, id.to_string())) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BackendError::new(
                BackendErrorKind::Conflict,
                format!("Document {} already exists in {}", id, collection),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(document.clone());
                Ok(document)
            }
        }
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        let mut entry = self
            .documents
            .get_mut(&(collection, id.to_string()))
            .ok_or_else(|| {
                BackendError::not_found(format!("Document {} not found in {}", id, collection))
            })?;

        for (key, value) in fields {
            entry.fields.insert(key, value);
        }

        Ok(entry.clone())
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<(), BackendError> {
        self.documents
            .remove(&(collection, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| {
                BackendError::not_found(format!("Document {} not found in {}", id, collection))
            })
    }

    async fn list_documents(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<Document>, BackendError> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .filter(|entry| {
                query
                    .equals
                    .iter()
                    .all(|(field, value)| field_matches(entry.value(), field, value))
            })
            .map(|entry| entry.value().clone())
            .collect();

        match &query.order_desc {
            Some(SortKey::CreatedAt) => documents.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            Some(SortKey::Field(name)) => documents.sort_by(|a, b| {
                b.field_str(name)
                    .unwrap_or_default()
                    .cmp(&a.field_str(name).unwrap_or_default())
            }),
            // Insertion order when unsorted.
            None => documents.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }

        Ok(documents)
    }
}
