//! Untyped records as the document store hands them out, and the query shape
//! the panels need from it.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, ser::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The six logical collections the dashboard reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Communities,
    Incidents,
    Meetings,
    Posts,
    Services,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Communities => "communities",
            Collection::Incidents => "incidents",
            Collection::Meetings => "meetings",
            Collection::Posts => "posts",
            Collection::Services => "services",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Deserialize into a typed record. `id` and `created_at` are injected
    /// from the document metadata and override same-named fields.
    pub fn into_record<T: Record>(self) -> Result<T, serde_json::Error> {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        fields.insert(
            "created_at".to_string(),
            Value::String(self.created_at.to_rfc3339()),
        );
        serde_json::from_value(Value::Object(fields))
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Serialize a record into the field map the store accepts.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(serde_json::Error::custom(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// A typed view over one collection.
pub trait Record: DeserializeOwned {
    const COLLECTION: Collection;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// Document creation timestamp maintained by the store.
    CreatedAt,
    Field(&'static str),
}

/// Equality filters plus an optional descending sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub equals: Vec<(String, String)>,
    pub order_desc: Option<SortKey>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn order_desc(mut self, key: SortKey) -> Self {
        self.order_desc = Some(key);
        self
    }
}

/// Treat `""` and `null` alike: hosted stores return either for unset strings.
pub(crate) fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        id: String,
        created_at: DateTime<Utc>,
        title: String,
        #[serde(default, deserialize_with = "empty_as_none")]
        note: Option<String>,
    }

    impl Record for Sample {
        const COLLECTION: Collection = Collection::Posts;
    }

    #[test]
    fn into_record_injects_metadata() {
        let created_at = Utc::now();
        let doc = Document {
            id: "p1".to_string(),
            created_at,
            fields: json!({ "title": "Hola", "id": "spoofed", "note": "" })
                .as_object()
                .cloned()
                .unwrap(),
        };

        let sample: Sample = doc.into_record().unwrap();
        assert_eq!(sample.id, "p1");
        assert_eq!(sample.title, "Hola");
        assert_eq!(sample.note, None);
        assert_eq!(sample.created_at.timestamp(), created_at.timestamp());
    }

    #[test]
    fn list_query_builder_accumulates_filters() {
        let query = ListQuery::new()
            .where_eq("community_id", "c1")
            .order_desc(SortKey::CreatedAt);
        assert_eq!(query.equals, vec![("community_id".to_string(), "c1".to_string())]);
        assert_eq!(query.order_desc, Some(SortKey::CreatedAt));
    }
}
