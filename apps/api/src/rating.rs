//! Credential ratings.
//!
//! A resume starts from a static score derived from its work and school
//! entries; every approval adds 0.1 and every disapproval takes 0.1 away,
//! floored at zero. Posts use the average initial rating of their author's
//! resumes in the post's tags as the starting point.

use crate::models::{ResumeRow, ValidationRow};

/// Weight of a single approval or disapproval.
pub const VOTE_WEIGHT: f64 = 0.1;

/// Weight of one school entry relative to one work entry.
pub const SCHOOL_WEIGHT: f64 = 0.5;

/// `|work| + 0.5 * |school|`
pub fn initial_rating(work: &[String], school: &[String]) -> f64 {
    work.len() as f64 + SCHOOL_WEIGHT * school.len() as f64
}

/// `max(0, base + 0.1 * (approvals - disapprovals))`
pub fn calculate_rating(base: f64, validation: &ValidationRow) -> f64 {
    rating_from_counts(base, validation.approvals(), validation.disapprovals())
}

pub fn rating_from_counts(base: f64, approvals: usize, disapprovals: usize) -> f64 {
    let net = approvals as f64 - disapprovals as f64;
    (base + VOTE_WEIGHT * net).max(0.0)
}

/// Mean initial rating of the resumes whose field is one of `tags`.
/// Returns 0.0 when nothing matches.
pub fn field_base_rating(resumes: &[ResumeRow], tags: &[String]) -> f64 {
    let ratings: Vec<f64> = resumes
        .iter()
        .filter(|r| tags.iter().any(|t| *t == r.field))
        .map(|r| r.initial_rating)
        .collect();
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().sum::<f64>() / ratings.len() as f64
}
