use crate::handlers::{dashboard::list_records, hx_redirect, theme::Theme};
use crate::middleware::auth::{existing_store, release_if_idle, store_for, CLIENT_KEY};
use crate::models::{Community, ListQuery, Role};
use crate::services::NewAccount;
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use service_core::error::AppError;
use tower_sessions::Session;
use uuid::Uuid;
use validator::Validate;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub theme: Theme,
    pub signup: bool,
    pub communities: Vec<Community>,
}

#[derive(Deserialize, Default)]
pub struct LoginPageParams {
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El email es obligatorio"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "La contraseña es obligatoria"))]
    pub password: String,
}

#[derive(Deserialize, Validate)]
pub struct SignupForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El nombre es obligatorio"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "El email es obligatorio"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "La contraseña es obligatoria"))]
    pub password: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub community_id: String,
    #[serde(default)]
    pub unit: String,
}

impl From<SignupForm> for NewAccount {
    fn from(form: SignupForm) -> Self {
        NewAccount {
            name: form.name.trim().to_string(),
            email: form.email.trim().to_string(),
            password: form.password,
            phone: form.phone.trim().to_string(),
            role: form.role.parse::<Role>().ok(),
            community_id: Some(form.community_id).filter(|id| !id.trim().is_empty()),
            unit: form.unit.trim().to_string(),
        }
    }
}

pub async fn login_page(
    State(state): State<AppState>,
    Query(params): Query<LoginPageParams>,
    theme: Theme,
) -> Response {
    let signup = params.mode.as_deref() == Some("signup");

    // Community picker for the signup form; the page still renders without it.
    let communities = if signup {
        list_records::<Community>(&state, ListQuery::new())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not load communities for signup");
                Vec::new()
            })
    } else {
        Vec::new()
    };

    LoginTemplate {
        theme,
        signup,
        communities,
    }
    .into_response()
}

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    form.validate()?;

    let store = store_for(&session, &state.sessions).await?;
    if let Err(e) = state
        .gateway
        .login(&store, &form.email, &form.password)
        .await
    {
        release_if_idle(&session, &state.sessions).await;
        return Err(e.into());
    }

    Ok(hx_redirect("/dashboard"))
}

pub async fn signup_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    form.validate()?;

    let store = store_for(&session, &state.sessions).await?;
    if let Err(e) = state.gateway.signup(&store, form.into()).await {
        release_if_idle(&session, &state.sessions).await;
        return Err(e.into());
    }

    Ok(hx_redirect("/dashboard"))
}

pub async fn logout_handler(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    if let Some(store) = existing_store(&session, &state.sessions).await {
        state.gateway.logout(&store).await;
    }

    if let Ok(Some(key)) = session.get::<Uuid>(CLIENT_KEY).await {
        state.sessions.remove(&key);
    }

    // Clear the browser session regardless of the provider outcome
    session.clear().await;

    hx_redirect("/login")
}
