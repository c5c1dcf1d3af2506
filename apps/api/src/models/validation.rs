use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;

/// Which collection a validation record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Resume,
    Post,
    Map,
}

impl ValidationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationKind::Resume => "resume",
            ValidationKind::Post => "post",
            ValidationKind::Map => "map",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Approve,
    Refute,
    Undo,
}

/// NotFound for an object created without a validation record.
pub fn missing_validation(object_id: Uuid) -> AppError {
    AppError::not_found(format!("Object with id: {object_id} does not have validation"))
}

/// Approve / disapprove record attached to one resume, post or map.
///
/// Invariant: a voter id appears in at most one of `have_validated` and
/// `have_refuted`, and at most once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRow {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(skip)]
    pub kind: String,
    pub object_id: Uuid,
    pub have_validated: Vec<Uuid>,
    pub have_refuted: Vec<Uuid>,
    #[serde(rename = "dateCreated")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dateUpdated")]
    pub updated_at: DateTime<Utc>,
}

impl ValidationRow {
    pub fn new(kind: ValidationKind, object_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: kind.as_str().to_string(),
            object_id,
            have_validated: Vec::new(),
            have_refuted: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Empty record for targets whose record is missing; never persisted.
    pub fn empty(kind: ValidationKind, object_id: Uuid) -> Self {
        Self::new(kind, object_id)
    }

    pub fn approvals(&self) -> usize {
        self.have_validated.len()
    }

    pub fn disapprovals(&self) -> usize {
        self.have_refuted.len()
    }

    pub fn has_voted(&self, voter: Uuid) -> bool {
        self.have_validated.contains(&voter) || self.have_refuted.contains(&voter)
    }

    pub fn approve(&mut self, voter: Uuid) -> Result<(), AppError> {
        self.ensure_not_voted(voter)?;
        self.have_validated.push(voter);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn refute(&mut self, voter: Uuid) -> Result<(), AppError> {
        self.ensure_not_voted(voter)?;
        self.have_refuted.push(voter);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Removes the voter from whichever list holds it.
    /// Returns whether anything changed.
    pub fn undo(&mut self, voter: Uuid) -> bool {
        let before = self.have_validated.len() + self.have_refuted.len();
        self.have_validated.retain(|v| *v != voter);
        self.have_refuted.retain(|v| *v != voter);
        let changed = before != self.have_validated.len() + self.have_refuted.len();
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Returns whether the record changed. Undo without a prior vote is a no-op.
    pub fn apply(&mut self, voter: Uuid, vote: Vote) -> Result<bool, AppError> {
        match vote {
            Vote::Approve => self.approve(voter).map(|()| true),
            Vote::Refute => self.refute(voter).map(|()| true),
            Vote::Undo => Ok(self.undo(voter)),
        }
    }

    fn ensure_not_voted(&self, voter: Uuid) -> Result<(), AppError> {
        if self.has_voted(voter) {
            return Err(AppError::not_allowed("Can't vote on object twice"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ValidationRow {
        ValidationRow::new(ValidationKind::Resume, Uuid::new_v4())
    }

    #[test]
    fn test_approve_then_refute_rejected() {
        let voter = Uuid::new_v4();
        let mut v = record();
        v.approve(voter).unwrap();
        assert!(matches!(v.refute(voter), Err(AppError::NotAllowed(_))));
        assert_eq!(v.approvals(), 1);
        assert_eq!(v.disapprovals(), 0);
    }

    #[test]
    fn test_double_approve_rejected() {
        let voter = Uuid::new_v4();
        let mut v = record();
        v.approve(voter).unwrap();
        assert!(v.approve(voter).is_err());
        assert_eq!(v.approvals(), 1);
    }

    #[test]
    fn test_undo_allows_switching_sides() {
        let voter = Uuid::new_v4();
        let mut v = record();
        v.refute(voter).unwrap();
        assert!(v.undo(voter));
        v.approve(voter).unwrap();
        assert_eq!(v.have_validated, vec![voter]);
        assert!(v.have_refuted.is_empty());
    }

    #[test]
    fn test_undo_absent_is_noop() {
        let mut v = record();
        v.approve(Uuid::new_v4()).unwrap();
        assert!(!v.undo(Uuid::new_v4()));
        assert_eq!(v.approvals(), 1);
    }

    #[test]
    fn test_apply_reports_changes() {
        let voter = Uuid::new_v4();
        let mut v = record();
        assert!(!v.apply(voter, Vote::Undo).unwrap());
        assert!(v.apply(voter, Vote::Refute).unwrap());
        assert!(v.apply(voter, Vote::Approve).is_err());
        assert!(v.apply(voter, Vote::Undo).unwrap());
        assert_eq!(v.approvals() + v.disapprovals(), 0);
    }

    #[test]
    fn test_voter_never_in_both_lists() {
        let voters: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let mut v = record();
        for (i, voter) in voters.iter().enumerate() {
            let _ = if i % 2 == 0 { v.approve(*voter) } else { v.refute(*voter) };
            let _ = v.approve(*voter);
            let _ = v.refute(*voter);
        }
        for voter in &voters {
            let both = v.have_validated.contains(voter) && v.have_refuted.contains(voter);
            assert!(!both);
        }
        assert_eq!(v.approvals() + v.disapprovals(), voters.len());
    }

    #[test]
    fn test_kind_not_serialized() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("kind").is_none());
        assert!(json.get("haveValidated").is_some());
        assert!(json.get("objectId").is_some());
    }
}
