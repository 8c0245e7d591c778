#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use eco_vecinos::config::ServerSettings;
use eco_vecinos::models::{to_fields, Collection, Community, Principal, Profile, Role};
use eco_vecinos::services::backend::{unique_id, DocumentStore, IdentityProvider, InMemoryBackend};
use eco_vecinos::services::{AuthGateway, SessionRegistry};
use eco_vecinos::startup::build_router;
use eco_vecinos::AppState;
use http_body_util::BodyExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "clave-segura";
pub const VIDEO_BASE_URL: &str = "https://meet.example.org/sala-";

pub struct TestApp {
    pub router: Router,
    pub backend: Arc<InMemoryBackend>,
    pub sessions: Arc<SessionRegistry>,
}

pub async fn spawn_app() -> TestApp {
    let backend = Arc::new(InMemoryBackend::new());
    let sessions = Arc::new(SessionRegistry::new());
    if let Some(changes) = backend.subscribe() {
        sessions.clone().spawn_listener(changes);
    }

    let gateway = Arc::new(AuthGateway::new(backend.clone(), backend.clone()));
    let state = AppState::new(gateway, sessions.clone(), backend.clone(), VIDEO_BASE_URL);
    let server = ServerSettings {
        host: "127.0.0.1".to_string(),
        port: 0,
        secure_cookies: false,
        session_idle_hours: 1,
    };

    TestApp {
        router: build_router(state, &server),
        backend,
        sessions,
    }
}

impl TestApp {
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookies: BTreeMap::new(),
        }
    }

    /// Account plus profile, as signup would leave them.
    pub async fn seed_user(
        &self,
        email: &str,
        name: &str,
        role: Option<Role>,
        community_id: Option<&str>,
    ) -> Principal {
        let profile = Profile {
            id: String::new(),
            name: name.to_string(),
            email: email.to_string(),
            phone: String::new(),
            role,
            community_id: community_id.map(str::to_string),
            unit: String::new(),
            linked_owner_id: None,
            created_at: None,
        };
        self.backend
            .seed_user(email, PASSWORD, profile)
            .await
            .expect("Failed to seed user")
    }

    /// Account without a profile document.
    pub async fn seed_account_only(&self, email: &str, name: &str) -> Principal {
        self.backend
            .create_account(&unique_id(), email, PASSWORD, name)
            .await
            .expect("Failed to create account")
    }

    pub async fn seed_community(&self, id: &str, name: &str) {
        let community = Community {
            id: String::new(),
            name: name.to_string(),
            address: "Calle Mayor 1".to_string(),
            president_id: None,
            created_at: None,
        };
        self.backend
            .create_document(Collection::Communities, id, to_fields(&community).unwrap())
            .await
            .expect("Failed to seed community");
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.backend.document_count(collection)
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn hx_redirect(&self) -> Option<&str> {
        self.header("hx-redirect")
    }
}

/// A browser: keeps cookies between requests.
pub struct TestClient {
    router: Router,
    cookies: BTreeMap<String, String>,
}

fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' => out.push('+'),
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '+' => out.push_str("%2B"),
            _ => out.push(c),
        }
    }
    out
}

impl TestClient {
    pub async fn get(&mut self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("hx-request", "true")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn login(&mut self, email: &str) -> TestResponse {
        self.post("/login", &[("email", email), ("password", PASSWORD)])
            .await
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    async fn send(&mut self, mut request: Request<Body>) -> TestResponse {
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();

        for value in response.headers().get_all(header::SET_COOKIE) {
            let raw = value.to_str().unwrap();
            let pair = raw.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                let expired = raw.to_ascii_lowercase().contains("max-age=0");
                if value.is_empty() || expired {
                    self.cookies.remove(name.trim());
                } else {
                    self.cookies
                        .insert(name.trim().to_string(), value.to_string());
                }
            }
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}
