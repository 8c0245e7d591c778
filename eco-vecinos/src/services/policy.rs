//! Role capabilities and community scoping.
//!
//! Every privilege check in the dashboard goes through [`can_perform`]; the
//! handlers never compare roles directly.

use crate::models::{Identity, Incident, ListQuery, Role};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ManageCommunities,
    ViewNeighbors,
    ManageNeighbors,
    AssignPresident,
    ActAcrossCommunities,
    ReportIncident,
    EditAnyIncident,
    DeleteIncident,
    ChangeIncidentStatus,
    ScheduleMeeting,
    CancelMeeting,
    JoinMeeting,
    PublishNotice,
    DeleteNotice,
    ManageServices,
}

const ADMIN: &[Role] = &[Role::SuperAdmin];
const MANAGERS: &[Role] = &[Role::SuperAdmin, Role::President];
const EVERYONE: &[Role] = &Role::ALL;

impl Action {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Action::ManageCommunities | Action::AssignPresident | Action::ActAcrossCommunities => {
                ADMIN
            }
            Action::ViewNeighbors
            | Action::ManageNeighbors
            | Action::EditAnyIncident
            | Action::DeleteIncident
            | Action::ChangeIncidentStatus
            | Action::ScheduleMeeting
            | Action::CancelMeeting
            | Action::PublishNotice
            | Action::DeleteNotice
            | Action::ManageServices => MANAGERS,
            Action::ReportIncident | Action::JoinMeeting => EVERYONE,
        }
    }
}

/// `None` (no profile, or an unrecognised role) grants nothing.
pub fn can_perform(role: Option<Role>, action: Action) -> bool {
    role.is_some_and(|role| action.allowed_roles().contains(&role))
}

pub fn can_edit_incident(identity: &Identity, incident: &Incident) -> bool {
    can_perform(identity.role, Action::EditAnyIncident) || incident.reported_by(&identity.id)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("role is not allowed to {0:?}")]
    Forbidden(Action),

    #[error("no community selected")]
    MissingCommunity,
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Forbidden(_) => {
                AppError::Forbidden(anyhow::anyhow!("No tienes permiso para esta acción"))
            }
            PolicyError::MissingCommunity => {
                AppError::BadRequest(anyhow::anyhow!("Selecciona una comunidad"))
            }
        }
    }
}

pub fn require(identity: &Identity, action: Action) -> Result<(), PolicyError> {
    if can_perform(identity.role, action) {
        Ok(())
    } else {
        tracing::warn!(user_id = %identity.id, ?action, "Action denied");
        Err(PolicyError::Forbidden(action))
    }
}

/// Which records a user may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    All,
    Community(String),
    /// Non-admin without a community: sees nothing.
    Unaffiliated,
}

impl QueryScope {
    pub fn for_identity(identity: &Identity) -> Self {
        if can_perform(identity.role, Action::ActAcrossCommunities) {
            return QueryScope::All;
        }
        match &identity.community_id {
            Some(community_id) => QueryScope::Community(community_id.clone()),
            None => QueryScope::Unaffiliated,
        }
    }

    /// Narrow `query` to this scope; `None` means the result is empty without
    /// asking the store.
    pub fn apply(&self, query: ListQuery) -> Option<ListQuery> {
        match self {
            QueryScope::All => Some(query),
            QueryScope::Community(id) => Some(query.where_eq("community_id", id.as_str())),
            QueryScope::Unaffiliated => None,
        }
    }
}

/// Community a new record is written into. Admins pick one explicitly;
/// everyone else writes into their own.
pub fn target_community(
    identity: &Identity,
    requested: Option<&str>,
) -> Result<String, PolicyError> {
    let requested = requested.map(str::trim).filter(|id| !id.is_empty());

    let chosen = if can_perform(identity.role, Action::ActAcrossCommunities) {
        requested
    } else {
        identity.community_id.as_deref()
    };

    chosen
        .map(str::to_string)
        .ok_or(PolicyError::MissingCommunity)
}
