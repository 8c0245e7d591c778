//! Resource panels behind the route guard.

pub mod communities;
pub mod incidents;
pub mod meetings;
pub mod neighbors;
pub mod notices;

use crate::models::{Community, Identity, ListQuery, Record};
use crate::services::navigation::{visible_nav, NavItem, NAV_ITEMS};
use crate::services::policy::{can_perform, Action, QueryScope};
use crate::AppState;
use service_core::error::AppError;
use std::collections::HashMap;

/// Sidebar and header data shared by every panel page.
pub struct Chrome {
    pub nav: Vec<NavItem>,
    pub active: &'static str,
    pub user_name: String,
    pub initials: String,
    pub role_label: &'static str,
    pub panel_title: &'static str,
}

impl Chrome {
    pub fn new(identity: &Identity, active: &'static str) -> Self {
        Self {
            nav: visible_nav(identity.role, NAV_ITEMS),
            active,
            user_name: identity.display_name().to_string(),
            initials: identity.initials(),
            role_label: identity.role.map(|role| role.label()).unwrap_or("Sin rol"),
            panel_title: identity.panel_title(),
        }
    }
}

/// Typed records of one collection; malformed documents are skipped.
pub(crate) async fn list_records<T: Record>(
    state: &AppState,
    query: ListQuery,
) -> Result<Vec<T>, AppError> {
    let documents = state
        .documents
        .list_documents(T::COLLECTION, &query)
        .await?;

    Ok(documents
        .into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match doc.into_record::<T>() {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(collection = %T::COLLECTION, id = %id, error = %e, "Skipping malformed record");
                    None
                }
            }
        })
        .collect())
}

/// Like [`list_records`], narrowed to what `identity` may see.
pub(crate) async fn list_scoped<T: Record>(
    state: &AppState,
    identity: &Identity,
    query: ListQuery,
) -> Result<Vec<T>, AppError> {
    match QueryScope::for_identity(identity).apply(query) {
        Some(query) => list_records(state, query).await,
        None => Ok(Vec::new()),
    }
}

pub(crate) async fn load_record<T: Record>(state: &AppState, id: &str) -> Result<T, AppError> {
    let document = state.documents.get_document(T::COLLECTION, id).await?;
    document
        .into_record::<T>()
        .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))
}

/// Communities offered in pickers; only cross-community users get any.
pub(crate) async fn community_choices(
    state: &AppState,
    identity: &Identity,
) -> Result<Vec<Community>, AppError> {
    if can_perform(identity.role, Action::ActAcrossCommunities) {
        list_records(state, ListQuery::new()).await
    } else {
        Ok(Vec::new())
    }
}

pub(crate) fn community_names(communities: &[Community]) -> HashMap<String, String> {
    communities
        .iter()
        .map(|community| (community.id.clone(), community.name.clone()))
        .collect()
}

/// Trimmed text, `None` when blank.
pub(crate) fn non_blank(value: &str) -> Option<String> {
    Some(value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(crate) fn format_date(value: Option<chrono::DateTime<chrono::Utc>>) -> String {
    value
        .map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}
