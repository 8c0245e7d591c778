//! Login, signup, logout and session resolution against the identity
//! provider, with the resulting identity written into a [`SessionStore`].

use crate::models::{to_fields, Collection, Identity, Profile, Role};
use crate::services::backend::{
    unique_id, BackendError, BackendErrorKind, DocumentStore, IdentityProvider, ProviderSession,
};
use crate::services::session_store::{SessionStore, Ticket};
use metrics::counter;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Too many attempts")]
    RateLimited,

    #[error("Account already exists")]
    AccountAlreadyExists,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Missing required field: {0}")]
    ValidationMissing(&'static str),

    /// A newer sign-in or sign-out overtook this operation.
    #[error("Superseded by a newer session change")]
    Superseded,
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        match err.kind {
            BackendErrorKind::InvalidCredentials | BackendErrorKind::Unauthorized => {
                AuthError::InvalidCredentials
            }
            BackendErrorKind::RateLimited => AuthError::RateLimited,
            BackendErrorKind::Conflict => AuthError::AccountAlreadyExists,
            _ => AuthError::Provider(err.message),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Email o contraseña incorrectos"))
            }
            AuthError::RateLimited => AppError::TooManyRequests(
                "Demasiados intentos. Espera un minuto antes de volver a intentarlo.".to_string(),
                Some(60),
            ),
            AuthError::AccountAlreadyExists => {
                AppError::Conflict(anyhow::anyhow!("Ya existe una cuenta con ese email"))
            }
            AuthError::Provider(message) => AppError::BadGateway(message),
            AuthError::ValidationMissing(field) => {
                AppError::BadRequest(anyhow::anyhow!("Falta el campo obligatorio: {}", field))
            }
            AuthError::Superseded => AppError::Conflict(anyhow::anyhow!(
                "La sesión cambió mientras se procesaba la petición"
            )),
        }
    }
}

/// Fields collected by the signup form.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub role: Option<Role>,
    pub community_id: Option<String>,
    pub unit: String,
}

fn require_field(name: &'static str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        Err(AuthError::ValidationMissing(name))
    } else {
        Ok(())
    }
}

fn record(operation: &'static str, result: &Result<Identity, AuthError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(AuthError::InvalidCredentials) => "invalid_credentials",
        Err(AuthError::RateLimited) => "rate_limited",
        Err(AuthError::AccountAlreadyExists) => "conflict",
        Err(AuthError::ValidationMissing(_)) => "validation",
        Err(AuthError::Superseded) => "superseded",
        Err(AuthError::Provider(_)) => "provider_error",
    };
    counter!("auth_attempts_total", "operation" => operation, "outcome" => outcome).increment(1);
}

pub struct AuthGateway {
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
}

impl AuthGateway {
    pub fn new(identity: Arc<dyn IdentityProvider>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            identity,
            documents,
        }
    }

    /// Re-derive the store's identity from its credential.
    pub async fn resolve(&self, store: &SessionStore) -> Option<Identity> {
        let credential = store.credential();
        let ticket = store.begin_resolution();

        let identity = match self.fetch_identity(credential.as_ref()).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Session resolution failed");
                None
            }
        };

        if !store.complete(ticket, identity) {
            tracing::debug!("Discarded stale session resolution");
        }
        store.identity()
    }

    pub async fn login(
        &self,
        store: &SessionStore,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let result = self.try_login(store, email, password).await;
        record("login", &result);
        match &result {
            Ok(identity) => tracing::info!(user_id = %identity.id, "User logged in"),
            Err(e) => tracing::warn!(error = %e, "Login failed"),
        }
        result
    }

    async fn try_login(
        &self,
        store: &SessionStore,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        require_field("email", email)?;
        require_field("password", password)?;

        let ticket = self.open_session(store, email, password).await?;
        self.finish(store, ticket).await
    }

    pub async fn signup(
        &self,
        store: &SessionStore,
        account: NewAccount,
    ) -> Result<Identity, AuthError> {
        let result = self.try_signup(store, account).await;
        record("signup", &result);
        match &result {
            Ok(identity) => tracing::info!(user_id = %identity.id, "Account created"),
            Err(e) => tracing::warn!(error = %e, "Signup failed"),
        }
        result
    }

    async fn try_signup(
        &self,
        store: &SessionStore,
        account: NewAccount,
    ) -> Result<Identity, AuthError> {
        require_field("name", &account.name)?;
        require_field("email", &account.email)?;
        require_field("password", &account.password)?;

        let role = match account.role {
            Some(Role::SuperAdmin) => {
                tracing::warn!(email = %account.email, "Self-assigned super_admin downgraded to owner");
                Role::Owner
            }
            Some(role) => role,
            None => Role::Owner,
        };

        let principal = self
            .identity
            .create_account(
                &unique_id(),
                account.email.trim(),
                &account.password,
                &account.name,
            )
            .await?;

        let ticket = self
            .open_session(store, &account.email, &account.password)
            .await?;

        let profile = Profile {
            id: principal.id.clone(),
            name: account.name,
            email: principal.email.clone(),
            phone: account.phone,
            role: Some(role),
            community_id: account.community_id.filter(|id| !id.trim().is_empty()),
            unit: account.unit,
            linked_owner_id: None,
            created_at: None,
        };

        let created = match to_fields(&profile) {
            Ok(fields) => self
                .documents
                .create_document(Collection::Users, &principal.id, fields)
                .await
                .map_err(AuthError::from),
            Err(e) => Err(AuthError::Provider(e.to_string())),
        };

        if let Err(e) = created {
            // The account and session exist; let the store reflect that
            // before reporting the failure.
            tracing::error!(user_id = %principal.id, error = %e, "Profile creation failed");
            self.finish(store, ticket).await?;
            return Err(e);
        }

        self.finish(store, ticket).await
    }

    /// Clear local state first, then revoke the provider session best-effort.
    pub async fn logout(&self, store: &SessionStore) {
        let Some(credential) = store.sign_out() else {
            tracing::debug!("Logout without a provider session");
            return;
        };

        match self.identity.delete_session(&credential).await {
            Ok(()) => tracing::info!("Provider session revoked"),
            Err(e) => tracing::warn!(error = %e, "Failed to revoke provider session"),
        }
    }

    /// Create a provider session and attach it to `store` under a fresh
    /// ticket. An already-active session is reused.
    async fn open_session<'s>(
        &self,
        store: &'s SessionStore,
        email: &str,
        password: &str,
    ) -> Result<Ticket<'s>, AuthError> {
        let previous = store.identity();
        let existing = store.credential();
        let ticket = store.begin_resolution();

        let created = self
            .identity
            .create_session(existing.as_ref(), email.trim(), password)
            .await;

        let credential = match (created, existing) {
            (Ok(credential), _) => credential,
            (Err(e), Some(existing)) if e.is(BackendErrorKind::SessionAlreadyActive) => {
                tracing::debug!("Session already active, reusing it");
                existing
            }
            (Err(e), _) => {
                store.complete(ticket, previous);
                return Err(e.into());
            }
        };

        if !store.attach_credential(&ticket, credential.clone()) {
            drop(ticket);
            match self.identity.delete_session(&credential).await {
                Ok(()) => tracing::debug!("Revoked superseded provider session"),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to revoke superseded provider session")
                }
            }
            return Err(AuthError::Superseded);
        }

        Ok(ticket)
    }

    async fn finish(
        &self,
        store: &SessionStore,
        ticket: Ticket<'_>,
    ) -> Result<Identity, AuthError> {
        let credential = store.credential();
        let identity = self.fetch_identity(credential.as_ref()).await;

        match identity {
            Ok(Some(identity)) => {
                if store.complete(ticket, Some(identity.clone())) {
                    Ok(identity)
                } else {
                    Err(AuthError::Superseded)
                }
            }
            Ok(None) => {
                store.complete(ticket, None);
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => {
                store.complete(ticket, None);
                Err(e.into())
            }
        }
    }

    /// Principal merged with its profile. A missing or unreadable profile
    /// yields a provider-only identity.
    async fn fetch_identity(
        &self,
        credential: Option<&ProviderSession>,
    ) -> Result<Option<Identity>, BackendError> {
        let Some(credential) = credential else {
            return Ok(None);
        };

        let Some(principal) = self.identity.current_principal(credential).await? else {
            return Ok(None);
        };

        let profile = self
            .documents
            .get_document(Collection::Users, &principal.id)
            .await
            .and_then(|doc| {
                doc.into_record::<Profile>()
                    .map_err(|e| BackendError::provider(e.to_string()))
            });

        Ok(Some(match profile {
            Ok(profile) => Identity::merge(principal, profile),
            Err(e) => {
                tracing::warn!(user_id = %principal.id, error = %e, "User has no readable profile");
                Identity::from_principal(principal)
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, ListQuery, Principal};
    use crate::services::backend::InMemoryBackend;
    use crate::services::session_store::SessionPhase;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use tokio::sync::Notify;

    fn gateway(backend: Arc<InMemoryBackend>) -> AuthGateway {
        AuthGateway::new(backend.clone(), backend)
    }

    fn profile(name: &str, role: Role) -> Profile {
        Profile {
            id: String::new(),
            name: name.to_string(),
            email: String::new(),
            phone: String::new(),
            role: Some(role),
            community_id: Some("c1".to_string()),
            unit: "2B".to_string(),
            linked_owner_id: None,
            created_at: None,
        }
    }

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            name: "Lucía".to_string(),
            email: email.to_string(),
            password: "clave".to_string(),
            ..NewAccount::default()
        }
    }

    #[tokio::test]
    async fn login_merges_profile() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::President))
            .await
            .unwrap();
        let gateway = gateway(backend);
        let store = SessionStore::new();

        let identity = gateway
            .login(&store, "ana@example.com", "clave")
            .await
            .unwrap();

        assert_eq!(identity.role, Some(Role::President));
        assert_eq!(identity.community_id.as_deref(), Some("c1"));
        assert_eq!(store.identity(), Some(identity));
    }

    #[tokio::test]
    async fn wrong_password_leaves_store_anonymous() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::Owner))
            .await
            .unwrap();
        let gateway = gateway(backend);
        let store = SessionStore::new();

        let err = gateway
            .login(&store, "ana@example.com", "otra")
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(store.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn missing_field_fails_before_provider_call() {
        let backend = Arc::new(InMemoryBackend::new());
        let gateway = gateway(backend.clone());
        let store = SessionStore::new();

        let err = gateway.login(&store, " ", "clave").await.unwrap_err();

        assert_eq!(err, AuthError::ValidationMissing("email"));
        assert_eq!(store.phase(), SessionPhase::Uninitialized);
        assert_eq!(backend.session_count(), 0);
    }

    #[tokio::test]
    async fn login_twice_reuses_active_session() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::Owner))
            .await
            .unwrap();
        let gateway = gateway(backend.clone());
        let store = SessionStore::new();

        gateway
            .login(&store, "ana@example.com", "clave")
            .await
            .unwrap();
        let again = gateway.login(&store, "ana@example.com", "clave").await;

        assert!(again.is_ok());
        assert_eq!(backend.session_count(), 1);
    }

    #[tokio::test]
    async fn login_logout_login_ends_with_latest_principal() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::Owner))
            .await
            .unwrap();
        backend
            .seed_user("luis@example.com", "clave", profile("Luis", Role::Tenant))
            .await
            .unwrap();
        let gateway = gateway(backend.clone());
        let store = SessionStore::new();

        gateway
            .login(&store, "ana@example.com", "clave")
            .await
            .unwrap();
        gateway.logout(&store).await;
        assert_eq!(store.phase(), SessionPhase::Anonymous);

        let identity = gateway
            .login(&store, "luis@example.com", "clave")
            .await
            .unwrap();
        assert_eq!(identity.name, "Luis");
        assert_eq!(store.identity().map(|i| i.name), Some("Luis".to_string()));
        assert_eq!(backend.session_count(), 1);
    }

    #[tokio::test]
    async fn signup_creates_one_profile_with_default_role() {
        let backend = Arc::new(InMemoryBackend::new());
        let gateway = gateway(backend.clone());
        let store = SessionStore::new();

        let identity = gateway
            .signup(&store, new_account("lucia@example.com"))
            .await
            .unwrap();

        assert_eq!(identity.role, Some(Role::Owner));
        assert_eq!(backend.document_count(Collection::Users), 1);
        let doc = backend
            .get_document(Collection::Users, &identity.id)
            .await
            .unwrap();
        assert_eq!(doc.field_str("role"), Some("owner"));
    }

    #[tokio::test]
    async fn duplicate_signup_leaves_no_orphan_profile() {
        let backend = Arc::new(InMemoryBackend::new());
        let gateway = gateway(backend.clone());

        gateway
            .signup(&SessionStore::new(), new_account("lucia@example.com"))
            .await
            .unwrap();
        let err = gateway
            .signup(&SessionStore::new(), new_account("lucia@example.com"))
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::AccountAlreadyExists);
        assert_eq!(backend.document_count(Collection::Users), 1);
    }

    #[tokio::test]
    async fn signup_cannot_self_assign_super_admin() {
        let backend = Arc::new(InMemoryBackend::new());
        let gateway = gateway(backend);
        let mut account = new_account("eve@example.com");
        account.role = Some(Role::SuperAdmin);

        let identity = gateway
            .signup(&SessionStore::new(), account)
            .await
            .unwrap();
        assert_eq!(identity.role, Some(Role::Owner));
    }

    #[tokio::test]
    async fn missing_profile_yields_provider_only_identity() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .create_account("u1", "solo@example.com", "clave", "Solo")
            .await
            .unwrap();
        let gateway = gateway(backend);
        let store = SessionStore::new();

        let identity = gateway
            .login(&store, "solo@example.com", "clave")
            .await
            .unwrap();

        assert_eq!(identity.id, "u1");
        assert_eq!(identity.role, None);
    }

    #[tokio::test]
    async fn logout_with_dead_provider_session_still_clears_state() {
        let backend = Arc::new(InMemoryBackend::new());
        let principal = backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::Owner))
            .await
            .unwrap();
        let gateway = gateway(backend.clone());
        let store = SessionStore::new();
        gateway
            .login(&store, "ana@example.com", "clave")
            .await
            .unwrap();

        backend.revoke_principal(&principal.id);
        gateway.logout(&store).await;

        assert_eq!(store.phase(), SessionPhase::Anonymous);
    }

    /// Document store whose profile reads block until released.
    struct GatedDocuments {
        inner: Arc<InMemoryBackend>,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DocumentStore for GatedDocuments {
        async fn get_document(
            &self,
            collection: Collection,
            id: &str,
        ) -> Result<Document, BackendError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.get_document(collection, id).await
        }

        async fn create_document(
            &self,
            collection: Collection,
            id: &str,
            fields: Map<String, Value>,
        ) -> Result<Document, BackendError> {
            self.inner.create_document(collection, id, fields).await
        }

        async fn update_document(
            &self,
            collection: Collection,
            id: &str,
            fields: Map<String, Value>,
        ) -> Result<Document, BackendError> {
            self.inner.update_document(collection, id, fields).await
        }

        async fn delete_document(
            &self,
            collection: Collection,
            id: &str,
        ) -> Result<(), BackendError> {
            self.inner.delete_document(collection, id).await
        }

        async fn list_documents(
            &self,
            collection: Collection,
            query: &ListQuery,
        ) -> Result<Vec<Document>, BackendError> {
            self.inner.list_documents(collection, query).await
        }
    }

    #[tokio::test]
    async fn logout_during_profile_fetch_is_not_resurrected() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::Owner))
            .await
            .unwrap();
        let documents = Arc::new(GatedDocuments {
            inner: backend.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let gateway = Arc::new(AuthGateway::new(backend.clone(), documents.clone()));
        let store = Arc::new(SessionStore::new());

        let login = tokio::spawn({
            let gateway = gateway.clone();
            let store = store.clone();
            async move { gateway.login(&store, "ana@example.com", "clave").await }
        });

        documents.entered.notified().await;
        gateway.logout(&store).await;
        documents.release.notify_one();

        let result = login.await.unwrap();
        assert_eq!(result, Err(AuthError::Superseded));
        assert_eq!(store.phase(), SessionPhase::Anonymous);
        assert_eq!(backend.session_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_login_does_not_leave_store_resolving() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::Owner))
            .await
            .unwrap();
        let documents = Arc::new(GatedDocuments {
            inner: backend.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let gateway = Arc::new(AuthGateway::new(backend.clone(), documents.clone()));
        let store = Arc::new(SessionStore::new());

        let login = tokio::spawn({
            let gateway = gateway.clone();
            let store = store.clone();
            async move { gateway.login(&store, "ana@example.com", "clave").await }
        });

        documents.entered.notified().await;
        login.abort();
        assert!(login.await.unwrap_err().is_cancelled());

        assert!(!store.is_loading());
        assert_eq!(store.phase(), SessionPhase::Anonymous);

        // The provider session survives the cancellation so logout can revoke it.
        assert_eq!(backend.session_count(), 1);
        gateway.logout(&store).await;
        assert_eq!(backend.session_count(), 0);
    }

    /// Identity provider whose session creation blocks until released.
    struct GatedSessions {
        inner: Arc<InMemoryBackend>,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl IdentityProvider for GatedSessions {
        async fn current_principal(
            &self,
            session: &ProviderSession,
        ) -> Result<Option<Principal>, BackendError> {
            self.inner.current_principal(session).await
        }

        async fn create_session(
            &self,
            active: Option<&ProviderSession>,
            email: &str,
            password: &str,
        ) -> Result<ProviderSession, BackendError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.create_session(active, email, password).await
        }

        async fn create_account(
            &self,
            id: &str,
            email: &str,
            password: &str,
            name: &str,
        ) -> Result<Principal, BackendError> {
            self.inner.create_account(id, email, password, name).await
        }

        async fn delete_session(&self, session: &ProviderSession) -> Result<(), BackendError> {
            self.inner.delete_session(session).await
        }
    }

    #[tokio::test]
    async fn logout_during_session_creation_revokes_the_late_session() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .seed_user("ana@example.com", "clave", profile("Ana", Role::Owner))
            .await
            .unwrap();
        let identity = Arc::new(GatedSessions {
            inner: backend.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let gateway = Arc::new(AuthGateway::new(identity.clone(), backend.clone()));
        let store = Arc::new(SessionStore::new());

        let login = tokio::spawn({
            let gateway = gateway.clone();
            let store = store.clone();
            async move { gateway.login(&store, "ana@example.com", "clave").await }
        });

        identity.entered.notified().await;
        gateway.logout(&store).await;
        identity.release.notify_one();

        let result = login.await.unwrap();
        assert_eq!(result, Err(AuthError::Superseded));
        assert_eq!(store.phase(), SessionPhase::Anonymous);
        assert!(store.credential().is_none());
        assert_eq!(backend.session_count(), 0);
    }
}
