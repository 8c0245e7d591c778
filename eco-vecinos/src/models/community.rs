use super::document::{empty_as_none, Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub president_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Community {
    pub fn has_president(&self) -> bool {
        self.president_id.is_some()
    }
}

impl Record for Community {
    const COLLECTION: Collection = Collection::Communities;
}
