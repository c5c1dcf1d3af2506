use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::rating::initial_rating;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRow {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub author: Uuid,
    pub field: String,
    pub work: Vec<String>,
    pub school: Vec<String>,
    /// Always `initial_rating(work, school)`; recomputed by `rederive_rating`.
    pub initial_rating: f64,
    #[serde(rename = "dateCreated")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dateUpdated")]
    pub updated_at: DateTime<Utc>,
}

impl ResumeRow {
    pub fn new(author: Uuid, field: String, work: Vec<String>, school: Vec<String>) -> Self {
        let now = Utc::now();
        let initial_rating = initial_rating(&work, &school);
        Self {
            id: Uuid::new_v4(),
            author,
            field,
            work,
            school,
            initial_rating,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn rederive_rating(&mut self) {
        self.initial_rating = initial_rating(&self.work, &self.school);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_initial_rating() {
        let resume = ResumeRow::new(
            Uuid::new_v4(),
            "biology".into(),
            vec!["urop".into(), "lab".into()],
            vec!["MIT".into()],
        );
        assert!((resume.initial_rating - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rederive_after_edit() {
        let mut resume = ResumeRow::new(Uuid::new_v4(), "cs".into(), vec![], vec![]);
        resume.school = vec!["MIT".into(), "Harvard".into()];
        resume.rederive_rating();
        assert!((resume.initial_rating - 1.0).abs() < f64::EPSILON);
    }
}
