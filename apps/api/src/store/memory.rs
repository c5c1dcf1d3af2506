use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ResumeFilter, Store};
use crate::audience::remove_member;
use crate::errors::AppError;
use crate::models::validation::missing_validation;
use crate::models::{
    AnnotationRow, DependencyMapRow, PostRow, ResumeRow, UserRow, ValidationKind, ValidationRow,
    Vote,
};

/// Process-local store. Listing order matches `PgStore`: oldest first, then id.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRow>,
    resumes: HashMap<Uuid, ResumeRow>,
    posts: HashMap<Uuid, PostRow>,
    annotations: HashMap<Uuid, AnnotationRow>,
    validations: HashMap<(String, Uuid), ValidationRow>,
    maps: HashMap<Uuid, DependencyMapRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    /// Mirrors the `users.username` unique constraint.
    fn ensure_username_free(&self, user: &UserRow) -> Result<(), AppError> {
        if self
            .users
            .values()
            .any(|u| u.username == user.username && u.id != user.id)
        {
            return Err(AppError::not_allowed(format!(
                "User with username {} already exists!",
                user.username
            )));
        }
        Ok(())
    }
}

trait Document: Clone {
    fn key(&self) -> (DateTime<Utc>, Uuid);
}

macro_rules! document {
    ($($row:ty),*) => {
        $(impl Document for $row {
            fn key(&self) -> (DateTime<Utc>, Uuid) {
                (self.created_at, self.id)
            }
        })*
    };
}

document!(UserRow, ResumeRow, PostRow, AnnotationRow, ValidationRow, DependencyMapRow);

fn collect_sorted<'a, T: Document + 'a>(rows: impl Iterator<Item = &'a T>) -> Vec<T> {
    let mut out: Vec<T> = rows.cloned().collect();
    out.sort_by_key(|row| row.key());
    out
}

fn validation_key(kind: ValidationKind, object_id: Uuid) -> (String, Uuid) {
    (kind.as_str().to_string(), object_id)
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &UserRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.ensure_username_free(user)?;
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRow>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>, AppError> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRow>, AppError> {
        Ok(collect_sorted(self.tables.read().await.users.values()))
    }

    async fn update_user(&self, user: &UserRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.ensure_username_free(user)?;
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.write().await.users.remove(&id).is_some())
    }

    async fn insert_resume(&self, resume: &ResumeRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.resumes.insert(resume.id, resume.clone());
        Ok(())
    }

    async fn get_resume(&self, id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        Ok(self.tables.read().await.resumes.get(&id).cloned())
    }

    async fn list_resumes(&self, filter: ResumeFilter<'_>) -> Result<Vec<ResumeRow>, AppError> {
        let t = self.tables.read().await;
        Ok(collect_sorted(t.resumes.values().filter(|r| {
            filter.author.map_or(true, |a| r.author == a)
                && filter.field.map_or(true, |f| r.field == f)
        })))
    }

    async fn update_resume(&self, resume: &ResumeRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.resumes.insert(resume.id, resume.clone());
        Ok(())
    }

    async fn delete_resume(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.write().await.resumes.remove(&id).is_some())
    }

    async fn insert_post(&self, post: &PostRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<PostRow>, AppError> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn list_posts(&self, author: Option<Uuid>) -> Result<Vec<PostRow>, AppError> {
        let t = self.tables.read().await;
        Ok(collect_sorted(
            t.posts.values().filter(|p| author.map_or(true, |a| p.author == a)),
        ))
    }

    async fn list_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostRow>, AppError> {
        let t = self.tables.read().await;
        Ok(collect_sorted(ids.iter().filter_map(|id| t.posts.get(id))))
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.write().await.posts.remove(&id).is_some())
    }

    async fn remove_from_audiences(&self, member: Uuid) -> Result<u64, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let mut touched = 0;
        for post in t.posts.values_mut() {
            if remove_member(&mut post.audience, member) {
                post.updated_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_annotation(&self, note: &AnnotationRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.annotations.insert(note.id, note.clone());
        Ok(())
    }

    async fn get_annotation(&self, id: Uuid) -> Result<Option<AnnotationRow>, AppError> {
        Ok(self.tables.read().await.annotations.get(&id).cloned())
    }

    async fn list_annotations_for_post(&self, post: Uuid) -> Result<Vec<AnnotationRow>, AppError> {
        let t = self.tables.read().await;
        Ok(collect_sorted(
            t.annotations.values().filter(|n| n.original == post),
        ))
    }

    async fn list_annotations_by_author(
        &self,
        author: Uuid,
    ) -> Result<Vec<AnnotationRow>, AppError> {
        let t = self.tables.read().await;
        Ok(collect_sorted(
            t.annotations.values().filter(|n| n.author == author),
        ))
    }

    async fn count_annotations_by_author(&self, author: Uuid) -> Result<i64, AppError> {
        let t = self.tables.read().await;
        Ok(t.annotations.values().filter(|n| n.author == author).count() as i64)
    }

    async fn update_annotation(&self, note: &AnnotationRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.annotations.insert(note.id, note.clone());
        Ok(())
    }

    async fn delete_annotation(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.write().await.annotations.remove(&id).is_some())
    }

    async fn insert_validation(&self, validation: &ValidationRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.validations.insert(
            (validation.kind.clone(), validation.object_id),
            validation.clone(),
        );
        Ok(())
    }

    async fn get_validation(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
    ) -> Result<Option<ValidationRow>, AppError> {
        let t = self.tables.read().await;
        Ok(t.validations.get(&validation_key(kind, object_id)).cloned())
    }

    async fn list_validations(
        &self,
        kind: ValidationKind,
        object_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ValidationRow>, AppError> {
        let t = self.tables.read().await;
        Ok(collect_sorted(t.validations.values().filter(|v| {
            v.kind == kind.as_str() && object_ids.map_or(true, |ids| ids.contains(&v.object_id))
        })))
    }

    async fn apply_vote(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
        voter: Uuid,
        vote: Vote,
    ) -> Result<bool, AppError> {
        let mut t = self.tables.write().await;
        let voter_exists = t.users.contains_key(&voter);
        let record = t
            .validations
            .get_mut(&validation_key(kind, object_id))
            .ok_or_else(|| missing_validation(object_id))?;
        if !voter_exists && vote != Vote::Undo {
            return Err(AppError::Unauthenticated);
        }
        record.apply(voter, vote)
    }

    async fn delete_validation(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut t = self.tables.write().await;
        Ok(t.validations.remove(&validation_key(kind, object_id)).is_some())
    }

    async fn retract_votes(&self, voter: Uuid) -> Result<u64, AppError> {
        let mut t = self.tables.write().await;
        let touched = t
            .validations
            .values_mut()
            .map(|v| v.undo(voter))
            .filter(|changed| *changed)
            .count();
        Ok(touched as u64)
    }

    async fn insert_map(&self, map: &DependencyMapRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.maps.insert(map.id, map.clone());
        Ok(())
    }

    async fn get_map(&self, id: Uuid) -> Result<Option<DependencyMapRow>, AppError> {
        Ok(self.tables.read().await.maps.get(&id).cloned())
    }

    async fn list_maps(&self, author: Option<Uuid>) -> Result<Vec<DependencyMapRow>, AppError> {
        let t = self.tables.read().await;
        Ok(collect_sorted(
            t.maps.values().filter(|m| author.map_or(true, |a| m.author == a)),
        ))
    }

    async fn update_map(&self, map: &DependencyMapRow) -> Result<(), AppError> {
        let mut t = self.tables.write().await;
        t.maps.insert(map.id, map.clone());
        Ok(())
    }

    async fn delete_map(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.write().await.maps.remove(&id).is_some())
    }
}
