use super::{community_choices, community_names, list_scoped, non_blank, Chrome};
use crate::handlers::{hx_redirect, theme::Theme};
use crate::middleware::auth::CurrentUser;
use crate::models::{
    meeting::VIRTUAL_LOCATION, to_fields, Collection, Community, ListQuery, Meeting, SortKey,
};
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

pub struct MeetingRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub community: String,
    pub join_url: String,
}

#[derive(Template)]
#[template(path = "meetings.html")]
pub struct MeetingsTemplate {
    pub theme: Theme,
    pub chrome: Chrome,
    pub meetings: Vec<MeetingRow>,
    pub can_schedule: bool,
    pub can_cancel: bool,
    pub can_join: bool,
    pub communities: Vec<Community>,
    pub default_location: &'static str,
}

#[derive(Deserialize, Validate)]
pub struct MeetingForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El título es obligatorio"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "La fecha es obligatoria"))]
    pub date: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "La hora es obligatoria"))]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub community_id: String,
}

pub async fn meetings_panel(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    theme: Theme,
) -> Result<Response, AppError> {
    let meetings: Vec<Meeting> = list_scoped(
        &state,
        &identity,
        ListQuery::new().order_desc(SortKey::Field("date")),
    )
    .await?;

    let communities = community_choices(&state, &identity).await?;
    let names = community_names(&communities);

    let meetings = meetings
        .into_iter()
        .map(|meeting| MeetingRow {
            join_url: meeting.video_room_url(&state.video_base_url),
            location: meeting.display_location().to_string(),
            community: meeting
                .community_id
                .as_ref()
                .and_then(|id| names.get(id).cloned())
                .unwrap_or_default(),
            id: meeting.id,
            title: meeting.title,
            description: meeting.description,
            date: meeting.date,
            time: meeting.time,
        })
        .collect();

    Ok(MeetingsTemplate {
        theme,
        chrome: Chrome::new(&identity, "/dashboard/meetings"),
        meetings,
        can_schedule: can_perform(identity.role, Action::ScheduleMeeting),
        can_cancel: can_perform(identity.role, Action::CancelMeeting),
        can_join: can_perform(identity.role, Action::JoinMeeting),
        communities,
        default_location: VIRTUAL_LOCATION,
    }
    .into_response())
}

pub async fn schedule_meeting(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<MeetingForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ScheduleMeeting)?;
    let community_id = target_community(&identity, Some(&form.community_id))?;

    let meeting = Meeting {
        id: String::new(),
        title: form.title.trim().to_string(),
        description: form.description.trim().to_string(),
        date: form.date.trim().to_string(),
        time: form.time.trim().to_string(),
        location: non_blank(&form.location).unwrap_or_else(|| VIRTUAL_LOCATION.to_string()),
        community_id: Some(community_id),
        created_at: None,
    };
    let fields = to_fields(&meeting).map_err(|e| AppError::InternalError(e.into()))?;
    let created = state
        .documents
        .create_document(Collection::Meetings, &unique_id(), fields)
        .await?;

    tracing::info!(meeting_id = %created.id, date = %meeting.date, "Meeting scheduled");
    Ok(hx_redirect("/dashboard/meetings"))
}

pub async fn cancel_meeting(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require(&identity, Action::CancelMeeting)?;
    state
        .documents
        .delete_document(Collection::Meetings, &id)
        .await?;

    tracing::info!(meeting_id = %id, "Meeting cancelled");
    Ok(hx_redirect("/dashboard/meetings"))
}
