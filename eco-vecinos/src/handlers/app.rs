use crate::handlers::theme::Theme;
use crate::middleware::auth::{existing_store, settled_identity};
use crate::AppState;
use askama::Template;
use axum::{extract::State, response::IntoResponse};
use tower_sessions::Session;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub theme: Theme,
    pub signed_in: bool,
}

#[derive(Template)]
#[template(path = "about.html")]
pub struct AboutTemplate {
    pub theme: Theme,
}

pub async fn index(
    State(state): State<AppState>,
    session: Session,
    theme: Theme,
) -> impl IntoResponse {
    let signed_in = match existing_store(&session, &state.sessions).await {
        Some(store) => settled_identity(&state, &store).await.is_some(),
        None => false,
    };

    IndexTemplate { theme, signed_in }
}

pub async fn about(theme: Theme) -> impl IntoResponse {
    AboutTemplate { theme }
}

pub async fn health_check() -> &'static str {
    "OK"
}
