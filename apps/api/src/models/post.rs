use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PostRow {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub author: Uuid,
    pub title: String,
    pub content: String,
    /// User ids as strings, or `[EVERYONE]`. See `crate::audience`.
    pub audience: Vec<String>,
    pub tags: Vec<String>,
    #[serde(rename = "dateCreated")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dateUpdated")]
    pub updated_at: DateTime<Utc>,
}

impl PostRow {
    pub fn new(
        author: Uuid,
        title: String,
        content: String,
        audience: Vec<String>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author,
            title,
            content,
            audience,
            tags,
            created_at: now,
            updated_at: now,
        }
    }
}
