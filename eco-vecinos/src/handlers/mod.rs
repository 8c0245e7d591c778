pub mod app;
pub mod auth;
pub mod dashboard;
pub mod metrics;
pub mod theme;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Tell HTMX to navigate the whole page to `path`.
pub(crate) fn hx_redirect(path: &str) -> Response {
    (StatusCode::OK, [("HX-Redirect", path)]).into_response()
}
