// Domain types - plain data, no I/O
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A "post created" event as published by the post catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostEvent {
    pub id: i64,
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub views: u64,
}

/// The unit stored in every timeline and home feed. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub post_id: i64,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub score: f64,
}

impl FeedEntry {
    pub fn from_event(event: PostEvent, score: f64) -> Self {
        Self {
            post_id: event.id,
            author_id: event.user_id,
            media_url: event.media_url,
            snippet: event.description,
            tags: event.tags,
            created_at: event.created_at,
            score,
        }
    }
}

/// Ids arrive as strings from some producers and as integers from others.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_event_defaults_missing_counters() {
        let event: PostEvent = serde_json::from_str(
            r#"{"id": 7, "user_id": "alice", "description": "hi", "media_url": "",
                "tags": ["a"], "created_at": "2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.likes, 0);
        assert_eq!(event.views, 0);
        assert_eq!(event.tags, vec!["a"]);
    }

    #[test]
    fn post_event_accepts_numeric_author() {
        let event: PostEvent = serde_json::from_str(
            r#"{"id": 7, "user_id": 42, "created_at": "2024-05-01T12:00:00Z", "likes": 3}"#,
        )
        .unwrap();
        assert_eq!(event.user_id, "42");
        assert_eq!(event.likes, 3);
        assert!(event.description.is_empty());
    }

    #[test]
    fn feed_entry_omits_empty_optional_fields() {
        let entry = FeedEntry {
            post_id: 1,
            author_id: "bob".into(),
            media_url: String::new(),
            snippet: "text".into(),
            tags: Vec::new(),
            created_at: "2024-05-01T12:00:00Z".parse().unwrap(),
            score: 1.5,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("media_url").is_none());
        assert!(json.get("tags").is_none());
        assert_eq!(json["snippet"], "text");
    }
}
