//! Appwrite REST (v1) adapter.
//!
//! Account calls that act on behalf of a user carry the session secret in
//! `X-Appwrite-Session`; database and session-creation calls use the server
//! API key so the session secret is returned to us.

use super::{BackendError, BackendErrorKind, DocumentStore, IdentityProvider, ProviderSession};
use crate::config::AppwriteSettings;
use crate::models::{Collection, Document, ListQuery, Principal, SortKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use service_core::observability::TracedClientExt;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const KEY_HEADER: &str = "X-Appwrite-Key";
const SESSION_HEADER: &str = "X-Appwrite-Session";

/// Appwrite pages list results at 25 unless told otherwise.
const LIST_LIMIT: u32 = 100;

pub struct AppwriteBackend {
    client: Client,
    settings: AppwriteSettings,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct AccountBody {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    #[serde(rename = "$id")]
    id: String,
    #[serde(default)]
    secret: String,
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    documents: Vec<Value>,
}

impl AppwriteBackend {
    pub fn new(settings: AppwriteSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.endpoint.trim_end_matches('/'), path)
    }

    fn collection_id(&self, collection: Collection) -> &str {
        let ids = &self.settings.collections;
        match collection {
            Collection::Users => &ids.users,
            Collection::Communities => &ids.communities,
            Collection::Incidents => &ids.incidents,
            Collection::Meetings => &ids.meetings,
            Collection::Posts => &ids.posts,
            Collection::Services => &ids.services,
        }
    }

    fn documents_path(&self, collection: Collection) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.settings.database_id,
            self.collection_id(collection)
        )
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(PROJECT_HEADER, &self.settings.project_id)
            .header(KEY_HEADER, self.settings.api_key.expose_secret())
    }

    fn with_session(&self, request: RequestBuilder, session: &ProviderSession) -> RequestBuilder {
        request
            .header(PROJECT_HEADER, &self.settings.project_id)
            .header(SESSION_HEADER, session.secret.expose_secret())
    }

    /// Send and map non-2xx responses to a classified [`BackendError`].
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Appwrite request failed");
            BackendError::new(BackendErrorKind::Network, e.to_string())
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            message: status.to_string(),
            kind: String::new(),
        });

        let kind = classify(status, &body.kind);
        tracing::debug!(%status, error_type = %body.kind, ?kind, "Appwrite returned an error");
        Err(BackendError::new(kind, body.message))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::provider(format!("Malformed Appwrite response: {}", e)))
    }
}

/// Map an Appwrite error `type` (falling back to the status) to a stable kind.
fn classify(status: StatusCode, error_type: &str) -> BackendErrorKind {
    let by_type = match error_type {
        "user_invalid_credentials" | "user_password_mismatch" => {
            Some(BackendErrorKind::InvalidCredentials)
        }
        "user_session_already_exists" => Some(BackendErrorKind::SessionAlreadyActive),
        "general_rate_limit_exceeded" => Some(BackendErrorKind::RateLimited),
        "user_already_exists" | "document_already_exists" => Some(BackendErrorKind::Conflict),
        _ => None,
    };

    by_type.unwrap_or(match status {
        StatusCode::TOO_MANY_REQUESTS => BackendErrorKind::RateLimited,
        StatusCode::NOT_FOUND => BackendErrorKind::NotFound,
        StatusCode::CONFLICT => BackendErrorKind::Conflict,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendErrorKind::Unauthorized,
        _ => BackendErrorKind::Provider,
    })
}

/// Split Appwrite's `$`-prefixed metadata from the user attributes.
fn document_from_json(value: Value) -> Result<Document, BackendError> {
    let Value::Object(mut object) = value else {
        return Err(BackendError::provider("Document is not a JSON object"));
    };

    let id = object
        .get("$id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::provider("Document without $id"))?;

    let created_at = object
        .get("$createdAt")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::provider("Document without $createdAt"))
        .and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| BackendError::provider(format!("Bad $createdAt '{}': {}", raw, e)))
        })?;

    object.retain(|key, _| !key.starts_with('$'));

    Ok(Document {
        id,
        created_at,
        fields: object,
    })
}

fn list_queries(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = query
        .equals
        .iter()
        .map(|(field, value)| {
            (
                "queries[]",
                json!({ "method": "equal", "attribute": field, "values": [value] }).to_string(),
            )
        })
        .collect();

    if let Some(key) = &query.order_desc {
        let attribute = match key {
            SortKey::CreatedAt => "$createdAt",
            SortKey::Field(name) => *name,
        };
        params.push((
            "queries[]",
            json!({ "method": "orderDesc", "attribute": attribute }).to_string(),
        ));
    }

    params.push((
        "queries[]",
        json!({ "method": "limit", "values": [LIST_LIMIT] }).to_string(),
    ));

    params
}

#[async_trait]
impl IdentityProvider for AppwriteBackend {
    async fn current_principal(
        &self,
        session: &ProviderSession,
    ) -> Result<Option<Principal>, BackendError> {
        let request = self.with_session(self.client.traced_get(&self.url("/account")), session);

        match self.send(request).await {
            Ok(response) => {
                let account: AccountBody = Self::read_json(response).await?;
                Ok(Some(Principal {
                    id: account.id,
                    email: account.email,
                    name: account.name,
                }))
            }
            Err(e) if e.is(BackendErrorKind::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_session(
        &self,
        active: Option<&ProviderSession>,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, BackendError> {
        let mut request = self.with_key(self.client.traced_post(&self.url("/account/sessions/email")));
        if let Some(active) = active {
            request = request.header(SESSION_HEADER, active.secret.expose_secret());
        }

        let response = self
            .send(request.json(&json!({ "email": email, "password": password })))
            .await?;
        let session: SessionBody = Self::read_json(response).await?;

        if session.secret.is_empty() {
            return Err(BackendError::provider(
                "Session created without a secret; is the API key missing the sessions.write scope?",
            ));
        }

        Ok(ProviderSession {
            id: session.id,
            secret: Secret::new(session.secret),
        })
    }

    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Principal, BackendError> {
        let request = self
            .with_key(self.client.traced_post(&self.url("/account")))
            .json(&json!({
                "userId": id,
                "email": email,
                "password": password,
                "name": name,
            }));

        let account: AccountBody = Self::read_json(self.send(request).await?).await?;
        Ok(Principal {
            id: account.id,
            email: account.email,
            name: account.name,
        })
    }

    async fn delete_session(&self, session: &ProviderSession) -> Result<(), BackendError> {
        let request = self.with_session(
            self.client.traced_delete(&self.url("/account/sessions/current")),
            session,
        );
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for AppwriteBackend {
    async fn get_document(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Document, BackendError> {
        let url = self.url(&format!("{}/{}", self.documents_path(collection), id));
        let response = self.send(self.with_key(self.client.traced_get(&url))).await?;
        document_from_json(Self::read_json(response).await?)
    }

    async fn create_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        let url = self.url(&self.documents_path(collection));
        let request = self
            .with_key(self.client.traced_post(&url))
            .json(&json!({ "documentId": id, "data": fields }));
        let response = self.send(request).await?;
        document_from_json(Self::read_json(response).await?)
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        let url = self.url(&format!("{}/{}", self.documents_path(collection), id));
        let request = self
            .with_key(self.client.traced_patch(&url))
            .json(&json!({ "data": fields }));
        let response = self.send(request).await?;
        document_from_json(Self::read_json(response).await?)
    }

    async fn delete_document(&self, collection: Collection, id: &str) -> Result<(), BackendError> {
        let url = self.url(&format!("{}/{}", self.documents_path(collection), id));
        self.send(self.with_key(self.client.traced_delete(&url)))
            .await?;
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<Vec<Document>, BackendError> {
        let url = self.url(&self.documents_path(collection));
        let request = self
            .with_key(self.client.traced_get(&url))
            .query(&list_queries(query));
        let list: DocumentList = Self::read_json(self.send(request).await?).await?;
        list.documents.into_iter().map(document_from_json).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_error_type_over_status() {
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, "user_session_already_exists"),
            BackendErrorKind::SessionAlreadyActive
        );
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, "user_invalid_credentials"),
            BackendErrorKind::InvalidCredentials
        );
        assert_eq!(
            classify(StatusCode::CONFLICT, "user_already_exists"),
            BackendErrorKind::Conflict
        );
    }

    #[test]
    fn classify_falls_back_to_status() {
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, ""),
            BackendErrorKind::RateLimited
        );
        assert_eq!(
            classify(StatusCode::NOT_FOUND, "document_not_found"),
            BackendErrorKind::NotFound
        );
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, "general_unauthorized_scope"),
            BackendErrorKind::Unauthorized
        );
        assert_eq!(
            classify(StatusCode::BAD_GATEWAY, ""),
            BackendErrorKind::Provider
        );
    }

    #[test]
    fn document_metadata_is_stripped() {
        let doc = document_from_json(json!({
            "$id": "inc1",
            "$createdAt": "2024-03-01T10:00:00.000+00:00",
            "$permissions": [],
            "title": "Ascensor averiado",
            "community_id": "c1"
        }))
        .unwrap();

        assert_eq!(doc.id, "inc1");
        assert_eq!(doc.field_str("title"), Some("Ascensor averiado"));
        assert!(!doc.fields.contains_key("$permissions"));
        assert_eq!(doc.created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn list_queries_encode_filters_order_and_limit() {
        let params = list_queries(
            &ListQuery::new()
                .where_eq("community_id", "c1")
                .order_desc(SortKey::Field("date")),
        );

        assert_eq!(params.len(), 3);
        let equal: Value = serde_json::from_str(&params[0].1).unwrap();
        assert_eq!(equal["method"], "equal");
        assert_eq!(equal["values"][0], "c1");
        let order: Value = serde_json::from_str(&params[1].1).unwrap();
        assert_eq!(order["attribute"], "date");
    }
}
