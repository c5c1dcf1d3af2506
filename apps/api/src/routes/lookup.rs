//! Fetch-or-fail helpers shared by the handlers.

use uuid::Uuid;

use crate::audience::can_view;
use crate::errors::AppError;
use crate::models::{
    AnnotationRow, DependencyMapRow, PostRow, ResumeRow, UserRow, ValidationKind, ValidationRow,
};
use crate::models::validation::missing_validation;
use crate::rating::{calculate_rating, field_base_rating};
use crate::store::{ResumeFilter, Store};

pub async fn user_by_id(store: &dyn Store, id: Uuid) -> Result<UserRow, AppError> {
    store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {id} does not exist!")))
}

pub async fn user_by_username(store: &dyn Store, username: &str) -> Result<UserRow, AppError> {
    store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User with username {username} does not exist!")))
}

pub async fn resume(store: &dyn Store, id: Uuid) -> Result<ResumeRow, AppError> {
    store
        .get_resume(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Resume {id} could not be found")))
}

/// The post, provided `viewer` is in its audience.
pub async fn viewable_post(store: &dyn Store, id: Uuid, viewer: Uuid) -> Result<PostRow, AppError> {
    let post = store
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Cannot find post with id: {id}")))?;
    if !can_view(&post, viewer) {
        return Err(AppError::not_allowed(format!(
            "User {viewer} has no access to post {id}"
        )));
    }
    Ok(post)
}

pub async fn annotation(store: &dyn Store, id: Uuid) -> Result<AnnotationRow, AppError> {
    store
        .get_annotation(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Cannot find annotation with id: {id}")))
}

pub async fn map(store: &dyn Store, id: Uuid) -> Result<DependencyMapRow, AppError> {
    store
        .get_map(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Dependency map with id: {id} cannot be found")))
}

pub async fn validation(
    store: &dyn Store,
    kind: ValidationKind,
    object_id: Uuid,
) -> Result<ValidationRow, AppError> {
    store
        .get_validation(kind, object_id)
        .await?
        .ok_or_else(|| missing_validation(object_id))
}

/// Missing records rate as if nobody had voted.
pub async fn validation_or_empty(
    store: &dyn Store,
    kind: ValidationKind,
    object_id: Uuid,
) -> Result<ValidationRow, AppError> {
    Ok(store
        .get_validation(kind, object_id)
        .await?
        .unwrap_or_else(|| ValidationRow::empty(kind, object_id)))
}

pub async fn resume_rating(store: &dyn Store, resume: &ResumeRow) -> Result<f64, AppError> {
    let votes = validation_or_empty(store, ValidationKind::Resume, resume.id).await?;
    Ok(calculate_rating(resume.initial_rating, &votes))
}

/// Average author credential in the post's tags, adjusted by the post's own votes.
pub async fn post_rating(
    store: &dyn Store,
    post: &PostRow,
    votes: &ValidationRow,
) -> Result<f64, AppError> {
    let resumes = store
        .list_resumes(ResumeFilter {
            author: Some(post.author),
            field: None,
        })
        .await?;
    Ok(calculate_rating(field_base_rating(&resumes, &post.tags), votes))
}

pub fn ensure_author(author: Uuid, user: Uuid, what: &str, id: Uuid) -> Result<(), AppError> {
    if author != user {
        return Err(AppError::not_allowed(format!(
            "{user} is not the author of {what} {id}!"
        )));
    }
    Ok(())
}

/// Trims every entry and drops the blank ones.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn require_non_empty(value: &str, name: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_values(format!("{name} can't be empty")));
    }
    Ok(trimmed.to_string())
}
