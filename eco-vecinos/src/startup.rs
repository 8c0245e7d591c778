use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::ServerSettings;
use crate::handlers::{
    app::{about, health_check, index},
    auth::{login_handler, login_page, logout_handler, signup_handler},
    dashboard::{communities, incidents, meetings, neighbors, notices},
    metrics::metrics,
    theme::toggle_theme,
};
use crate::middleware::auth::require_session;
use crate::AppState;

fn dashboard_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(notices::notice_board))
        .route("/posts", post(notices::create_post))
        .route("/posts/:id/delete", post(notices::delete_post))
        .route("/services", post(notices::create_service))
        .route("/services/:id", post(notices::update_service))
        .route("/services/:id/delete", post(notices::delete_service))
        .route(
            "/communities",
            get(communities::communities_panel).post(communities::create_community),
        )
        .route("/communities/:id", post(communities::update_community))
        .route(
            "/communities/:id/delete",
            post(communities::delete_community),
        )
        .route(
            "/neighbors",
            get(neighbors::neighbors_panel).post(neighbors::create_neighbor),
        )
        .route("/neighbors/:id", post(neighbors::update_neighbor))
        .route("/neighbors/:id/delete", post(neighbors::delete_neighbor))
        .route(
            "/incidents",
            get(incidents::incidents_panel).post(incidents::report_incident),
        )
        .route("/incidents/:id", post(incidents::update_incident))
        .route("/incidents/:id/status", post(incidents::change_status))
        .route("/incidents/:id/delete", post(incidents::delete_incident))
        .route(
            "/meetings",
            get(meetings::meetings_panel).post(meetings::schedule_meeting),
        )
        .route("/meetings/:id/delete", post(meetings::cancel_meeting))
        .route_layer(from_fn_with_state(state, require_session))
}

pub fn build_router(state: AppState, server: &ServerSettings) -> Router {
    // Session setup
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(server.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            server.session_idle_hours,
        )));

    Router::new()
        .route("/", get(index))
        .route("/about", get(about))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/login", get(login_page).post(login_handler))
        .route("/signup", post(signup_handler))
        .route("/logout", post(logout_handler))
        .route("/theme", post(toggle_theme))
        .nest("/dashboard", dashboard_routes(state.clone()))
        .nest_service("/static", ServeDir::new("eco-vecinos/static"))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
