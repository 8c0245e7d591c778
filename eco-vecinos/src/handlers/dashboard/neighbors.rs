//! Residents of a community. Profiles created here have no login of their
//! own; they describe who lives where.

use super::{community_choices, community_names, list_scoped, load_record, non_blank, Chrome};
use crate::handlers::{hx_redirect, theme::Theme};
use crate::middleware::auth::CurrentUser;
use crate::models::{to_fields, Collection, Community, Identity, ListQuery, Profile, Role};
use crate::services::backend::unique_id;
use crate::services::policy::{can_perform, require, target_community, Action};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use service_core::error::AppError;
use validator::Validate;

#[derive(Clone)]
pub struct NeighborRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub unit: String,
    pub role: &'static str,
    pub role_label: &'static str,
    pub owner_id: String,
    pub owner_name: String,
    pub community_id: String,
    pub community: String,
}

pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Template)]
#[template(path = "neighbors.html")]
pub struct NeighborsTemplate {
    pub theme: Theme,
    pub chrome: Chrome,
    pub neighbors: Vec<NeighborRow>,
    pub owners: Vec<Choice>,
    pub roles: Vec<Choice>,
    pub communities: Vec<Community>,
    pub editing: Option<NeighborRow>,
}

#[derive(Deserialize, Default)]
pub struct PanelParams {
    #[serde(default)]
    pub edit: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct NeighborForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "El nombre es obligatorio"))]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "El rol es obligatorio"))]
    pub role: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub linked_owner_id: String,
    #[serde(default)]
    pub community_id: String,
}

fn assignable_roles(identity: &Identity) -> Vec<Role> {
    let mut roles = vec![Role::Owner, Role::Tenant];
    if can_perform(identity.role, Action::AssignPresident) {
        roles.insert(0, Role::President);
    }
    roles
}

/// Role requested by the form, checked against what `identity` may assign.
/// `current` is the neighbor's existing role when editing.
fn requested_role(
    identity: &Identity,
    raw: &str,
    current: Option<Role>,
) -> Result<Role, AppError> {
    let role: Role = raw
        .parse()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Rol no válido")))?;

    match role {
        Role::SuperAdmin => Err(AppError::BadRequest(anyhow::anyhow!("Rol no válido"))),
        Role::President if current != Some(Role::President) => {
            require(identity, Action::AssignPresident)?;
            Ok(role)
        }
        _ => Ok(role),
    }
}

fn linked_owner(role: Role, raw: &str) -> Result<Option<String>, AppError> {
    if role != Role::Tenant {
        return Ok(None);
    }
    non_blank(raw)
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Selecciona el propietario")))
}

/// Record the new president on the community card. Failure is logged only.
async fn mark_president(state: &AppState, community_id: &str, profile_id: &str) {
    let mut fields = Map::new();
    fields.insert("president_id".to_string(), Value::String(profile_id.to_string()));

    if let Err(e) = state
        .documents
        .update_document(Collection::Communities, community_id, fields)
        .await
    {
        tracing::warn!(community_id, error = %e, "Could not record community president");
    }
}

pub async fn neighbors_panel(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(params): Query<PanelParams>,
    theme: Theme,
) -> Result<Response, AppError> {
    if !can_perform(identity.role, Action::ViewNeighbors) {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let profiles: Vec<Profile> = list_scoped(&state, &identity, ListQuery::new()).await?;
    let profiles: Vec<Profile> = profiles
        .into_iter()
        .filter(|profile| profile.role != Some(Role::SuperAdmin))
        .collect();

    let communities = community_choices(&state, &identity).await?;
    let names = community_names(&communities);

    let owners: Vec<Choice> = profiles
        .iter()
        .filter(|p| matches!(p.role, Some(Role::Owner) | Some(Role::President)))
        .map(|p| Choice {
            value: p.id.clone(),
            label: p.name.clone(),
        })
        .collect();

    let owner_name = |id: &Option<String>| {
        id.as_ref()
            .and_then(|id| owners.iter().find(|owner| &owner.value == id))
            .map(|owner| owner.label.clone())
            .unwrap_or_default()
    };

    let neighbors: Vec<NeighborRow> = profiles
        .into_iter()
        .map(|profile| NeighborRow {
            owner_name: owner_name(&profile.linked_owner_id),
            owner_id: profile.linked_owner_id.clone().unwrap_or_default(),
            community: profile
                .community_id
                .as_ref()
                .and_then(|id| names.get(id).cloned())
                .unwrap_or_default(),
            community_id: profile.community_id.clone().unwrap_or_default(),
            role: profile.role.map(|r| r.as_str()).unwrap_or(""),
            role_label: profile.role.map(|r| r.label()).unwrap_or("Sin rol"),
            id: profile.id,
            name: profile.name,
            email: profile.email,
            phone: profile.phone,
            unit: profile.unit,
        })
        .collect();

    let editing = params
        .edit
        .and_then(|id| neighbors.iter().find(|n| n.id == id).cloned());

    let roles = assignable_roles(&identity)
        .into_iter()
        .map(|role| Choice {
            value: role.as_str().to_string(),
            label: role.label().to_string(),
        })
        .collect();

    Ok(NeighborsTemplate {
        theme,
        chrome: Chrome::new(&identity, "/dashboard/neighbors"),
        neighbors,
        owners,
        roles,
        communities,
        editing,
    }
    .into_response())
}

pub async fn create_neighbor(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Form(form): Form<NeighborForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ManageNeighbors)?;

    let role = requested_role(&identity, &form.role, None)?;
    let community_id = target_community(&identity, Some(&form.community_id))?;
    let linked_owner_id = linked_owner(role, &form.linked_owner_id)?;

    let profile = Profile {
        id: String::new(),
        name: form.name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
        role: Some(role),
        community_id: Some(community_id.clone()),
        unit: form.unit.trim().to_string(),
        linked_owner_id,
        created_at: None,
    };
    let fields = to_fields(&profile).map_err(|e| AppError::InternalError(e.into()))?;
    let created = state
        .documents
        .create_document(Collection::Users, &unique_id(), fields)
        .await?;

    if role == Role::President {
        mark_president(&state, &community_id, &created.id).await;
    }

    tracing::info!(profile_id = %created.id, role = %role, "Neighbor added");
    Ok(hx_redirect("/dashboard/neighbors"))
}

pub async fn update_neighbor(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<NeighborForm>,
) -> Result<Response, AppError> {
    form.validate()?;
    require(&identity, Action::ManageNeighbors)?;

    let existing: Profile = load_record(&state, &id).await?;
    if existing.role == Some(Role::SuperAdmin) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "No se puede modificar una cuenta de administración"
        )));
    }

    let role = requested_role(&identity, &form.role, existing.role)?;
    let linked_owner_id = linked_owner(role, &form.linked_owner_id)?;

    let community_id = if can_perform(identity.role, Action::ActAcrossCommunities) {
        non_blank(&form.community_id).or(existing.community_id)
    } else {
        existing.community_id
    };

    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(form.name.trim()));
    fields.insert("email".to_string(), json!(form.email.trim()));
    fields.insert("phone".to_string(), json!(form.phone.trim()));
    fields.insert("unit".to_string(), json!(form.unit.trim()));
    fields.insert("role".to_string(), json!(role.as_str()));
    fields.insert("linked_owner_id".to_string(), json!(linked_owner_id));
    fields.insert("community_id".to_string(), json!(community_id));

    state
        .documents
        .update_document(Collection::Users, &id, fields)
        .await?;

    if role == Role::President && existing.role != Some(Role::President) {
        if let Some(community_id) = &community_id {
            mark_president(&state, community_id, &id).await;
        }
    }

    tracing::info!(profile_id = %id, role = %role, "Neighbor updated");
    Ok(hx_redirect("/dashboard/neighbors"))
}

pub async fn delete_neighbor(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require(&identity, Action::ManageNeighbors)?;

    let existing: Profile = load_record(&state, &id).await?;
    if existing.role == Some(Role::SuperAdmin) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "No se puede eliminar una cuenta de administración"
        )));
    }

    state.documents.delete_document(Collection::Users, &id).await?;

    tracing::info!(profile_id = %id, "Neighbor removed");
    Ok(hx_redirect("/dashboard/neighbors"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> Identity {
        Identity {
            id: "me".to_string(),
            email: "me@example.com".to_string(),
            name: "Me".to_string(),
            role: Some(role),
            community_id: Some("c1".to_string()),
            unit: None,
            phone: None,
        }
    }

    #[test]
    fn president_cannot_appoint_president() {
        let president = identity(Role::President);
        assert!(requested_role(&president, "president", None).is_err());
        assert!(requested_role(&president, "president", Some(Role::President)).is_ok());
        assert!(requested_role(&president, "tenant", None).is_ok());
    }

    #[test]
    fn nobody_assigns_super_admin_here() {
        let admin = identity(Role::SuperAdmin);
        assert!(requested_role(&admin, "super_admin", None).is_err());
        assert!(requested_role(&admin, "president", None).is_ok());
    }

    #[test]
    fn only_tenants_link_to_an_owner() {
        assert_eq!(linked_owner(Role::Owner, "o1").unwrap(), None);
        assert_eq!(
            linked_owner(Role::Tenant, "o1").unwrap(),
            Some("o1".to_string())
        );
        assert!(linked_owner(Role::Tenant, " ").is_err());
    }

    #[test]
    fn role_choices_depend_on_caller() {
        assert_eq!(
            assignable_roles(&identity(Role::President)),
            vec![Role::Owner, Role::Tenant]
        );
        assert_eq!(
            assignable_roles(&identity(Role::SuperAdmin)),
            vec![Role::President, Role::Owner, Role::Tenant]
        );
    }
}
