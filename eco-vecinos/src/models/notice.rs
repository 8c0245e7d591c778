use super::document::{empty_as_none, Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notice board announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub community_id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Post {
    const COLLECTION: Collection = Collection::Posts;
}

/// Trade or emergency contact listed next to the notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceContact {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub community_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for ServiceContact {
    const COLLECTION: Collection = Collection::Services;
}
