use super::document::{empty_as_none, Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const VIRTUAL_LOCATION: &str = "Virtual (Videollamada)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Calendar date as entered, `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub community_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Meeting {
    pub fn video_room_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.id)
    }

    pub fn display_location(&self) -> &str {
        if self.location.trim().is_empty() {
            VIRTUAL_LOCATION
        } else {
            &self.location
        }
    }
}

impl Record for Meeting {
    const COLLECTION: Collection = Collection::Meetings;
}
