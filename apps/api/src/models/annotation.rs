use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRow {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// The annotated post.
    pub original: Uuid,
    pub author: Uuid,
    pub comment: String,
    pub quote: String,
    #[serde(rename = "dateCreated")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dateUpdated")]
    pub updated_at: DateTime<Utc>,
}

impl AnnotationRow {
    pub fn new(original: Uuid, author: Uuid, comment: String, quote: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original,
            author,
            comment,
            quote,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Newest-updated first; ties broken by id so the order is stable.
pub fn sort_by_recent_update(notes: &mut [AnnotationRow]) {
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_sort_newest_first() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let mut old = AnnotationRow::new(post, author, "old".into(), "q".into());
        old.updated_at -= Duration::minutes(5);
        let fresh = AnnotationRow::new(post, author, "fresh".into(), "q".into());

        let mut notes = vec![old, fresh];
        sort_by_recent_update(&mut notes);
        assert_eq!(notes[0].comment, "fresh");
        assert_eq!(notes[1].comment, "old");
    }
}
