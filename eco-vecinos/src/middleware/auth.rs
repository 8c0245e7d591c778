//! Route guard for the dashboard.
//!
//! Each browser carries a random client key in its `tower-sessions` session;
//! the key selects that browser's [`SessionStore`] in the registry. The guard
//! decides before any handler runs: an authenticated store lets the request
//! through with a [`CurrentUser`] extension, anything else is redirected to
//! the login page. A store that does not settle within [`SETTLE_TIMEOUT`]
//! counts as signed out.

use crate::models::Identity;
use crate::services::{SessionPhase, SessionRegistry, SessionStore};
use crate::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower_sessions::Session;
use uuid::Uuid;

pub const CLIENT_KEY: &str = "client_key";

pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of the signed-in user, placed in request extensions by
/// [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| Redirect::to("/login"))
    }
}

fn session_error(err: tower_sessions::session::Error) -> AppError {
    AppError::InternalError(anyhow::Error::new(err).context("Session storage failed"))
}

/// Store for this browser, creating the client key on first use.
pub async fn store_for(
    session: &Session,
    registry: &SessionRegistry,
) -> Result<Arc<SessionStore>, AppError> {
    let key = match session.get::<Uuid>(CLIENT_KEY).await.map_err(session_error)? {
        Some(key) => key,
        None => {
            let key = Uuid::new_v4();
            session
                .insert(CLIENT_KEY, key)
                .await
                .map_err(session_error)?;
            key
        }
    };
    Ok(registry.get_or_create(key))
}

/// Store for this browser if one was created earlier.
pub async fn existing_store(
    session: &Session,
    registry: &SessionRegistry,
) -> Option<Arc<SessionStore>> {
    match session.get::<Uuid>(CLIENT_KEY).await {
        Ok(Some(key)) => registry.get(&key),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read session");
            None
        }
    }
}

/// Forget this browser's store and client key if the store holds nothing.
pub async fn release_if_idle(session: &Session, registry: &SessionRegistry) {
    let key = match session.get::<Uuid>(CLIENT_KEY).await {
        Ok(Some(key)) => key,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read session");
            return;
        }
    };

    if registry.remove_if_idle(&key) {
        if let Err(e) = session.remove::<Uuid>(CLIENT_KEY).await {
            tracing::warn!(error = %e, "Could not clear client key");
        }
    }
}

/// Settled identity of `store`, resolving it first if nobody has yet and
/// waiting out a resolution already in flight.
pub async fn settled_identity(state: &AppState, store: &SessionStore) -> Option<Identity> {
    match store.phase() {
        SessionPhase::Authenticated(identity) => Some(identity),
        SessionPhase::Anonymous => None,
        SessionPhase::Uninitialized => {
            match timeout(SETTLE_TIMEOUT, state.gateway.resolve(store)).await {
                Ok(identity) => identity,
                Err(_) => {
                    tracing::warn!("Session resolution timed out");
                    None
                }
            }
        }
        SessionPhase::Resolving => wait_settled(store, SETTLE_TIMEOUT).await,
    }
}

/// Identity once a resolution in flight finishes, or `None` after `limit`.
async fn wait_settled(store: &SessionStore, limit: Duration) -> Option<Identity> {
    let mut changes = store.subscribe();
    let settled = match timeout(limit, changes.wait_for(|state| !state.is_loading())).await {
        Ok(Ok(state)) => state.identity().cloned(),
        Ok(Err(_)) => None,
        Err(_) => {
            tracing::warn!(generation = store.generation(), "Gave up waiting for session");
            None
        }
    };
    settled
}

pub async fn require_session(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match existing_store(&session, &state.sessions).await {
        Some(store) => settled_identity(&state, &store).await,
        None => None,
    };

    match identity {
        Some(identity) => {
            request.extensions_mut().insert(CurrentUser(identity));
            next.run(request).await
        }
        None => {
            release_if_idle(&session, &state.sessions).await;
            tracing::debug!(path = %request.uri().path(), "Unauthenticated request redirected");
            Redirect::to("/login").into_response()
        }
    }
}
