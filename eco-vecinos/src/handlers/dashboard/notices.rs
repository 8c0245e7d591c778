//! Notice board: announcements plus the community's service contacts.

use super::{community_choices, community_names, format_date, list_scoped, non_blank, Chrome};
use crate::handlers::{hx_redirect, theme::Theme};
use crate::middleware::auth::CurrentUser;
use crate::models::{to_fields, Collection, Community, ListQuery, Post, ServiceContact, SortKey};
use crate::services::backend::unique_id;
use crate::services::policy::{can_perform, require, target_community, Action};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

pub struct PostRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub date: String,
    pub community: String,
}

pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub contact: String,
    pub phone: String,
    pub community: String,
}

#[derive(Template)]
#[template(path = "notices.html")]
pub struct NoticesTemplate {
    pub theme: Theme,
    pub chrome: Chrome,
    pub posts: Vec<PostRow>,
    pub services: Vec<ServiceRow>,
    pub can_publish: bool,
    pub can_delete_posts: bool,
    pub can_manage_services: bool,
    pub communities: Vec<Community>,
}

#[derive(Deserialize, Validate)]
pub struct PostForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El título es obligatorio"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "El contenido es obligatorio"))]
    pub content: String,
    #[serde(default)]
    pub community_id: String,
}

#[derive(Deserialize, Validate)]
pub struct ServiceForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El nombre del servicio es obligatorio"))]
    pub name: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "El teléfono es obligatorio"))]
    pub phone: String,
    #[serde(default)]
    pub community_id: String,
}

pub async fn notice_board(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    theme: Theme,
) -> Result<Response, AppError> {
    let posts: Vec<Post> = list_scoped(
        &state,
        &identity,
        ListQuery::new().order_desc(SortKey::CreatedAt),
    )
    .await?;
    let services: Vec<ServiceContact> = list_scoped(&state, &identity, ListQuery::new()).await?;

    let communities = community_choices(&state, &identity).await?;
    let names = community_names(&communities);
    let community_of = |id: &Option<String>| {
        id.as_ref()
            .and_then(|id| names.get(id).cloned())
            .unwrap_or_default()
    };

    let posts = posts
        .into_iter()
        .map(|post| PostRow {
            community: community_of(&post.community_id),
            date: format_date(post.created_at),
            id: post.id,
            title: post.title,
            content: post.content,
        })
        .collect();

    let services = services
        .into_iter()
        .map(|service| ServiceRow {
            community: community_of(&service.community_id),
            id: service.id,
            name: service.name,
            contact: service.contact,
            phone: service.phone,
        })
        .collect();

    Ok(NoticesTemplate {
        theme,
        chrome: Chrome::new(&identity, "/dashboard"),
        posts,
        services,
        can_publish: can_perform(identity.role, Action::PublishNotice),
        can_delete_posts: can_perform(identity.role, Action::DeleteNotice),
        can_manage_services: can_perform(identity.role, Action::ManageServices),
        communities,
    }
    .into_response())
}

pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<PostForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::PublishNotice)?;
    let community_id = target_community(&identity, Some(&form.community_id))?;

    let post = Post {
        id: String::new(),
        title: form.title.trim().to_string(),
        content: form.content.trim().to_string(),
        community_id: Some(community_id),
        author_id: Some(identity.id.clone()),
        created_at: None,
    };
    let fields = to_fields(&post).map_err(|e| AppError::InternalError(e.into()))?;
    let created = state
        .documents
        .create_document(Collection::Posts, &unique_id(), fields)
        .await?;

    tracing::info!(post_id = %created.id, user_id = %identity.id, "Notice published");
    Ok(hx_redirect("/dashboard"))
}

pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require(&identity, Action::DeleteNotice)?;
    state.documents.delete_document(Collection::Posts, &id).await?;

    tracing::info!(post_id = %id, user_id = %identity.id, "Notice deleted");
    Ok(hx_redirect("/dashboard"))
}

fn service_contact(form: ServiceForm, community_id: Option<String>) -> ServiceContact {
    ServiceContact {
        id: String::new(),
        name: form.name.trim().to_string(),
        contact: form.contact.trim().to_string(),
        phone: form.phone.trim().to_string(),
        community_id,
        created_at: None,
    }
}

pub async fn create_service(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<ServiceForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ManageServices)?;
    let community_id = target_community(&identity, Some(&form.community_id))?;

    let service = service_contact(form, Some(community_id));
    let fields = to_fields(&service).map_err(|e| AppError::InternalError(e.into()))?;
    let created = state
        .documents
        .create_document(Collection::Services, &unique_id(), fields)
        .await?;

    tracing::info!(service_id = %created.id, "Service contact added");
    Ok(hx_redirect("/dashboard"))
}

pub async fn update_service(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<ServiceForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ManageServices)?;

    // Admins may move a contact; everyone else keeps its community.
    let community_id = if can_perform(identity.role, Action::ActAcrossCommunities) {
        non_blank(&form.community_id)
    } else {
        None
    };

    let mut fields = to_fields(&service_contact(form, community_id))
        .map_err(|e| AppError::InternalError(e.into()))?;
    if fields.get("community_id").is_some_and(|value| value.is_null()) {
        fields.remove("community_id");
    }

    state
        .documents
        .update_document(Collection::Services, &id, fields)
        .await?;

    tracing::info!(service_id = %id, "Service contact updated");
    Ok(hx_redirect("/dashboard"))
}

pub async fn delete_service(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require(&identity, Action::ManageServices)?;
    state
        .documents
        .delete_document(Collection::Services, &id)
        .await?;

    tracing::info!(service_id = %id, "Service contact deleted");
    Ok(hx_redirect("/dashboard"))
}
