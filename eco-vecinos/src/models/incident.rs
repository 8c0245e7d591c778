use super::document::{empty_as_none, Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 3] = [
        IncidentStatus::Pending,
        IncidentStatus::InProgress,
        IncidentStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "pending",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "Pendiente",
            IncidentStatus::InProgress => "En progreso",
            IncidentStatus::Resolved => "Resuelta",
        }
    }

    pub fn badge_class(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "status-pending",
            IncidentStatus::InProgress => "status-progress",
            IncidentStatus::Resolved => "status-resolved",
        }
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IncidentStatus::Pending),
            "in_progress" => Ok(IncidentStatus::InProgress),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(format!("unknown incident status: {}", other)),
        }
    }
}

// Unrecognised statuses display as pending rather than failing the list.
fn lenient_status<'de, D>(deserializer: D) -> Result<IncidentStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|s| s.parse().ok()).unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: IncidentStatus,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub community_id: Option<String>,
    /// Older records name the reporter `reporter_id`.
    #[serde(default, alias = "reporter_id", deserialize_with = "empty_as_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn is_resolved(&self) -> bool {
        self.status == IncidentStatus::Resolved
    }

    pub fn reported_by(&self, user_id: &str) -> bool {
        self.author_id.as_deref() == Some(user_id)
    }
}

impl Record for Incident {
    const COLLECTION: Collection = Collection::Incidents;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_reporter_field_maps_to_author() {
        let incident: Incident = serde_json::from_value(json!({
            "title": "Ascensor averiado",
            "reporter_id": "u7",
            "status": "in_progress"
        }))
        .unwrap();

        assert!(incident.reported_by("u7"));
        assert_eq!(incident.status, IncidentStatus::InProgress);
    }

    #[test]
    fn unknown_status_reads_as_pending() {
        let incident: Incident =
            serde_json::from_value(json!({ "title": "Fuga", "status": "archived" })).unwrap();
        assert_eq!(incident.status, IncidentStatus::Pending);
        assert!(!incident.is_resolved());
    }
}
