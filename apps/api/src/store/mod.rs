//! Document storage.
//!
//! Handlers only see `Arc<dyn Store>`: `PgStore` backs production, `MemoryStore`
//! serves local runs without `DATABASE_URL` and every handler test.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    AnnotationRow, DependencyMapRow, PostRow, ResumeRow, UserRow, ValidationKind, ValidationRow,
    Vote,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Optional resume constraints; `None` matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumeFilter<'a> {
    pub author: Option<Uuid>,
    pub field: Option<&'a str>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn insert_user(&self, user: &UserRow) -> Result<(), AppError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRow>, AppError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>, AppError>;
    async fn list_users(&self) -> Result<Vec<UserRow>, AppError>;
    async fn update_user(&self, user: &UserRow) -> Result<(), AppError>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError>;

    // Resumes
    async fn insert_resume(&self, resume: &ResumeRow) -> Result<(), AppError>;
    async fn get_resume(&self, id: Uuid) -> Result<Option<ResumeRow>, AppError>;
    async fn list_resumes(&self, filter: ResumeFilter<'_>) -> Result<Vec<ResumeRow>, AppError>;
    async fn update_resume(&self, resume: &ResumeRow) -> Result<(), AppError>;
    async fn delete_resume(&self, id: Uuid) -> Result<bool, AppError>;

    // Exclusive posts
    async fn insert_post(&self, post: &PostRow) -> Result<(), AppError>;
    async fn get_post(&self, id: Uuid) -> Result<Option<PostRow>, AppError>;
    async fn list_posts(&self, author: Option<Uuid>) -> Result<Vec<PostRow>, AppError>;
    /// Posts among `ids` that still exist.
    async fn list_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostRow>, AppError>;
    async fn delete_post(&self, id: Uuid) -> Result<bool, AppError>;
    /// Drops `member` from every post audience. Returns the number of posts touched.
    async fn remove_from_audiences(&self, member: Uuid) -> Result<u64, AppError>;

    // Annotations
    async fn insert_annotation(&self, note: &AnnotationRow) -> Result<(), AppError>;
    async fn get_annotation(&self, id: Uuid) -> Result<Option<AnnotationRow>, AppError>;
    async fn list_annotations_for_post(&self, post: Uuid) -> Result<Vec<AnnotationRow>, AppError>;
    async fn list_annotations_by_author(&self, author: Uuid)
        -> Result<Vec<AnnotationRow>, AppError>;
    async fn count_annotations_by_author(&self, author: Uuid) -> Result<i64, AppError>;
    async fn update_annotation(&self, note: &AnnotationRow) -> Result<(), AppError>;
    async fn delete_annotation(&self, id: Uuid) -> Result<bool, AppError>;

    // Validations
    async fn insert_validation(&self, validation: &ValidationRow) -> Result<(), AppError>;
    async fn get_validation(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
    ) -> Result<Option<ValidationRow>, AppError>;
    /// Records of one kind; `None` lists them all.
    async fn list_validations(
        &self,
        kind: ValidationKind,
        object_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ValidationRow>, AppError>;
    /// Applies one vote as a single atomic step. Returns whether the record changed.
    /// NotFound without a record, NotAllowed on a second vote, Unauthenticated
    /// once the voter's account is gone.
    async fn apply_vote(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
        voter: Uuid,
        vote: Vote,
    ) -> Result<bool, AppError>;
    async fn delete_validation(&self, kind: ValidationKind, object_id: Uuid)
        -> Result<bool, AppError>;
    /// Removes `voter` from every record of every kind. Returns the number of records touched.
    async fn retract_votes(&self, voter: Uuid) -> Result<u64, AppError>;

    // Dependency maps
    async fn insert_map(&self, map: &DependencyMapRow) -> Result<(), AppError>;
    async fn get_map(&self, id: Uuid) -> Result<Option<DependencyMapRow>, AppError>;
    async fn list_maps(&self, author: Option<Uuid>) -> Result<Vec<DependencyMapRow>, AppError>;
    async fn update_map(&self, map: &DependencyMapRow) -> Result<(), AppError>;
    async fn delete_map(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Validation records for `object_ids`, keyed by the object they belong to.
pub async fn validations_by_object(
    store: &dyn Store,
    kind: ValidationKind,
    object_ids: &[Uuid],
) -> Result<HashMap<Uuid, ValidationRow>, AppError> {
    let rows = store.list_validations(kind, Some(object_ids)).await?;
    Ok(rows.into_iter().map(|v| (v.object_id, v)).collect())
}

/// Usernames for `ids`, in the same order. Deleted users are skipped.
pub async fn usernames_for(store: &dyn Store, ids: &[Uuid]) -> Result<Vec<String>, AppError> {
    let mut names = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(user) = store.get_user(*id).await? {
            names.push(user.username);
        }
    }
    Ok(names)
}

/// Usernames keyed by user id, for resolving document authors.
pub async fn username_map(
    store: &dyn Store,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, String>, AppError> {
    let mut names = HashMap::new();
    for &id in ids {
        if names.contains_key(&id) {
            continue;
        }
        if let Some(user) = store.get_user(id).await? {
            names.insert(id, user.username);
        }
    }
    Ok(names)
}
