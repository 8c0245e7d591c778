//! Capability boundary to the hosted backend-as-a-service.
//!
//! The dashboard only ever talks to an [`IdentityProvider`] and a
//! [`DocumentStore`]. Concrete providers translate their own error payloads
//! into [`BackendErrorKind`] so nothing above this module inspects provider
//! messages.

mod appwrite;
mod memory;

pub use appwrite::AppwriteBackend;
pub use memory::InMemoryBackend;

use crate::models::{Collection, Document, ListQuery, Principal};
use async_trait::async_trait;
use secrecy::Secret;
use service_core::error::AppError;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    InvalidCredentials,
    /// A session already exists for the caller; creating another is refused.
    SessionAlreadyActive,
    RateLimited,
    NotFound,
    Conflict,
    Unauthorized,
    Network,
    Provider,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Provider, message)
    }

    pub fn is(&self, kind: BackendErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err.kind {
            BackendErrorKind::NotFound => {
                AppError::NotFound(anyhow::anyhow!("El registro no existe"))
            }
            BackendErrorKind::Conflict => {
                AppError::Conflict(anyhow::anyhow!("El registro ya existe"))
            }
            BackendErrorKind::Unauthorized | BackendErrorKind::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Tu sesión no es válida"))
            }
            BackendErrorKind::RateLimited => AppError::TooManyRequests(
                "Demasiadas peticiones. Inténtalo de nuevo en unos segundos.".to_string(),
                None,
            ),
            BackendErrorKind::SessionAlreadyActive
            | BackendErrorKind::Network
            | BackendErrorKind::Provider => {
                tracing::error!(kind = ?err.kind, message = %err.message, "Backend call failed");
                AppError::BadGateway(err.message)
            }
        }
    }
}

/// Credential for one provider-side session.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub id: String,
    pub secret: Secret<String>,
}

/// Push notification from providers that can report auth changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
    SessionRevoked { session_id: String },
    PrincipalRevoked { principal_id: String },
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Principal behind `session`, or `None` if the session is no longer valid.
    async fn current_principal(
        &self,
        session: &ProviderSession,
    ) -> Result<Option<Principal>, BackendError>;

    /// Open a session. `active` is the caller's existing session, if any;
    /// providers refuse with `SessionAlreadyActive` while it is still live.
    async fn create_session(
        &self,
        active: Option<&ProviderSession>,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, BackendError>;

    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Principal, BackendError>;

    async fn delete_session(&self, session: &ProviderSession) -> Result<(), BackendError>;

    /// Live auth-change feed; `None` for pull-only providers.
    fn subscribe(&self) -> Option<broadcast::Receiver<AuthChange>> {
        None
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: Collection, id: &str)
        -> Result<Document, BackendError>;

    async fn create_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, BackendError>;

    /// Partial update: only the given fields change.
    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, BackendError>;

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<(), BackendError>;

    async fn list_documents(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<Document>, BackendError>;
}

/// Fresh identifier accepted by every supported provider.
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
