use super::{list_records, load_record, Chrome};
use crate::handlers::{hx_redirect, theme::Theme};
use crate::middleware::auth::CurrentUser;
use crate::models::{to_fields, Collection, Community, ListQuery};
use crate::services::backend::unique_id;
use crate::services::policy::{can_perform, require, Action};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Template)]
#[template(path = "communities.html")]
pub struct CommunitiesTemplate {
    pub theme: Theme,
    pub chrome: Chrome,
    pub communities: Vec<Community>,
    /// Community whose edit form is open, if any.
    pub editing: Option<Community>,
}

#[derive(Deserialize, Default)]
pub struct PanelParams {
    #[serde(default)]
    pub edit: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct CommunityForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El nombre es obligatorio"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "La dirección es obligatoria"))]
    pub address: String,
}

pub async fn communities_panel(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(params): Query<PanelParams>,
    theme: Theme,
) -> Result<Response, AppError> {
    if !can_perform(identity.role, Action::ManageCommunities) {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let communities: Vec<Community> = list_records(&state, ListQuery::new()).await?;
    let editing = params
        .edit
        .and_then(|id| communities.iter().find(|c| c.id == id).cloned());

    Ok(CommunitiesTemplate {
        theme,
        chrome: Chrome::new(&identity, "/dashboard/communities"),
        communities,
        editing,
    }
    .into_response())
}

pub async fn create_community(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<CommunityForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ManageCommunities)?;

    let community = Community {
        id: String::new(),
        name: form.name.trim().to_string(),
        address: form.address.trim().to_string(),
        president_id: None,
        created_at: None,
    };
    let fields = to_fields(&community).map_err(|e| AppError::InternalError(e.into()))?;
    let created = state
        .documents
        .create_document(Collection::Communities, &unique_id(), fields)
        .await?;

    tracing::info!(community_id = %created.id, "Community created");
    Ok(hx_redirect("/dashboard/communities"))
}

pub async fn update_community(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<CommunityForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ManageCommunities)?;

    // Keep the assigned president untouched.
    let mut existing: Community = load_record(&state, &id).await?;
    existing.name = form.name.trim().to_string();
    existing.address = form.address.trim().to_string();

    let mut fields = to_fields(&existing).map_err(|e| AppError::InternalError(e.into()))?;
    fields.remove("president_id");
    state
        .documents
        .update_document(Collection::Communities, &id, fields)
        .await?;

    tracing::info!(community_id = %id, "Community updated");
    Ok(hx_redirect("/dashboard/communities"))
}

pub async fn delete_community(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require(&identity, Action::ManageCommunities)?;
    state
        .documents
        .delete_document(Collection::Communities, &id)
        .await?;

    tracing::info!(community_id = %id, "Community deleted");
    Ok(hx_redirect("/dashboard/communities"))
}
