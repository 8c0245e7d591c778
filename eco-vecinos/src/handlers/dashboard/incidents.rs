use super::{community_choices, community_names, format_date, list_scoped, load_record, Chrome};
use crate::handlers::{hx_redirect, theme::Theme};
use crate::middleware::auth::CurrentUser;
use crate::models::{
    to_fields, Collection, Community, Incident, IncidentStatus, ListQuery, SortKey,
};
use crate::services::backend::unique_id;
use crate::services::policy::{can_edit_incident, can_perform, require, target_community, Action};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use serde_json::{json, Map};
use service_core::error::AppError;
use validator::Validate;

#[derive(Clone)]
pub struct IncidentRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: &'static str,
    pub status_label: &'static str,
    pub badge: &'static str,
    pub date: String,
    pub community: String,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "incidents.html")]
pub struct IncidentsTemplate {
    pub theme: Theme,
    pub chrome: Chrome,
    pub incidents: Vec<IncidentRow>,
    pub show_resolved: bool,
    pub hidden_resolved: usize,
    pub can_delete: bool,
    pub can_change_status: bool,
    pub statuses: Vec<IncidentStatus>,
    pub communities: Vec<Community>,
    pub editing: Option<IncidentRow>,
}

#[derive(Deserialize, Default)]
pub struct PanelParams {
    #[serde(default)]
    pub show_resolved: bool,
    #[serde(default)]
    pub edit: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct IncidentForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El título es obligatorio"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "La descripción es obligatoria"))]
    pub description: String,
    #[serde(default)]
    pub community_id: String,
}

#[derive(Deserialize)]
pub struct StatusForm {
    pub status: String,
}

pub async fn incidents_panel(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(params): Query<PanelParams>,
    theme: Theme,
) -> Result<Response, AppError> {
    let incidents: Vec<Incident> = list_scoped(
        &state,
        &identity,
        ListQuery::new().order_desc(SortKey::CreatedAt),
    )
    .await?;

    let communities = community_choices(&state, &identity).await?;
    let names = community_names(&communities);

    let total = incidents.len();
    let incidents: Vec<IncidentRow> = incidents
        .into_iter()
        .filter(|incident| params.show_resolved || !incident.is_resolved())
        .map(|incident| IncidentRow {
            can_edit: can_edit_incident(&identity, &incident),
            status: incident.status.as_str(),
            status_label: incident.status.label(),
            badge: incident.status.badge_class(),
            date: format_date(incident.created_at),
            community: incident
                .community_id
                .as_ref()
                .and_then(|id| names.get(id).cloned())
                .unwrap_or_default(),
            id: incident.id,
            title: incident.title,
            description: incident.description,
        })
        .collect();

    let editing = params
        .edit
        .and_then(|id| incidents.iter().find(|i| i.id == id && i.can_edit).cloned());

    Ok(IncidentsTemplate {
        theme,
        chrome: Chrome::new(&identity, "/dashboard/incidents"),
        hidden_resolved: total - incidents.len(),
        incidents,
        show_resolved: params.show_resolved,
        can_delete: can_perform(identity.role, Action::DeleteIncident),
        can_change_status: can_perform(identity.role, Action::ChangeIncidentStatus),
        statuses: IncidentStatus::ALL.to_vec(),
        communities,
        editing,
    }
    .into_response())
}

pub async fn report_incident(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<IncidentForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ReportIncident)?;
    let community_id = target_community(&identity, Some(&form.community_id))?;

    let incident = Incident {
        id: String::new(),
        title: form.title.trim().to_string(),
        description: form.description.trim().to_string(),
        status: IncidentStatus::Pending,
        community_id: Some(community_id),
        author_id: Some(identity.id.clone()),
        created_at: None,
    };
    let fields = to_fields(&incident).map_err(|e| AppError::InternalError(e.into()))?;
    let created = state
        .documents
        .create_document(Collection::Incidents, &unique_id(), fields)
        .await?;

    tracing::info!(incident_id = %created.id, user_id = %identity.id, "Incident reported");
    Ok(hx_redirect("/dashboard/incidents"))
}

pub async fn update_incident(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<IncidentForm>,
) -> Result<Response, AppError> {
    form.validate()?;

    let incident: Incident = load_record(&state, &id).await?;
    if !can_edit_incident(&identity, &incident) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Solo quien la reportó o la presidencia pueden editar esta incidencia"
        )));
    }

    let mut fields = Map::new();
    fields.insert("title".to_string(), json!(form.title.trim()));
    fields.insert("description".to_string(), json!(form.description.trim()));
    state
        .documents
        .update_document(Collection::Incidents, &id, fields)
        .await?;

    tracing::info!(incident_id = %id, "Incident updated");
    Ok(hx_redirect("/dashboard/incidents"))
}

pub async fn change_status(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Response, AppError> {
    require(&identity, Action::ChangeIncidentStatus)?;
    let status: IncidentStatus = form
        .status
        .parse()
        .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let mut fields = Map::new();
    fields.insert("status".to_string(), json!(status.as_str()));
    state
        .documents
        .update_document(Collection::Incidents, &id, fields)
        .await?;

    tracing::info!(incident_id = %id, status = status.as_str(), "Incident status changed");
    Ok(hx_redirect("/dashboard/incidents"))
}

pub async fn delete_incident(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require(&identity, Action::DeleteIncident)?;
    state
        .documents
        .delete_document(Collection::Incidents, &id)
        .await?;

    tracing::info!(incident_id = %id, "Incident deleted");
    Ok(hx_redirect("/dashboard/incidents"))
}
