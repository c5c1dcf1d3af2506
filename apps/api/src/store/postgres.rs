use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ResumeFilter, Store};
use crate::errors::AppError;
use crate::models::validation::missing_validation;
use crate::models::{
    AnnotationRow, DependencyMapRow, PostRow, ResumeRow, UserRow, ValidationKind, ValidationRow,
    Vote,
};

/// PostgreSQL-backed store. Tables are created by `db::ensure_schema`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Each vote is one conditional UPDATE, so concurrent votes and a concurrent
// `retract_votes` never overwrite each other. Binds: kind, object id, voter.
const APPROVE_VOTE: &str = r#"
    UPDATE validations
    SET have_validated = array_append(have_validated, $3), updated_at = now()
    WHERE kind = $1 AND object_id = $2
      AND NOT ($3 = ANY(have_validated) OR $3 = ANY(have_refuted))
      AND EXISTS (SELECT 1 FROM users WHERE id = $3)
"#;

const REFUTE_VOTE: &str = r#"
    UPDATE validations
    SET have_refuted = array_append(have_refuted, $3), updated_at = now()
    WHERE kind = $1 AND object_id = $2
      AND NOT ($3 = ANY(have_validated) OR $3 = ANY(have_refuted))
      AND EXISTS (SELECT 1 FROM users WHERE id = $3)
"#;

const UNDO_VOTE: &str = r#"
    UPDATE validations
    SET have_validated = array_remove(have_validated, $3),
        have_refuted = array_remove(have_refuted, $3),
        updated_at = now()
    WHERE kind = $1 AND object_id = $2
      AND ($3 = ANY(have_validated) OR $3 = ANY(have_refuted))
"#;

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(code: Option<&str>) -> bool {
    code == Some(UNIQUE_VIOLATION)
}

/// Turns a lost race on `users.username` into the same error the pre-check gives.
fn username_conflict(err: sqlx::Error, username: &str) -> AppError {
    let taken = matches!(
        &err,
        sqlx::Error::Database(db) if is_unique_violation(db.code().as_deref())
    );
    if taken {
        AppError::not_allowed(format!("User with username {username} already exists!"))
    } else {
        AppError::Database(err)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &UserRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| username_conflict(e, &user.username))?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRow>, AppError> {
        let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>, AppError> {
        let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<UserRow>, AppError> {
        let users = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn update_user(&self, user: &UserRow) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET username = $1, password_hash = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| username_conflict(e, &user.username))?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_resume(&self, resume: &ResumeRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO resumes
                (id, author, field, work, school, initial_rating, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(resume.id)
        .bind(resume.author)
        .bind(&resume.field)
        .bind(&resume.work)
        .bind(&resume.school)
        .bind(resume.initial_rating)
        .bind(resume.created_at)
        .bind(resume.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_resume(&self, id: Uuid) -> Result<Option<ResumeRow>, AppError> {
        let resume = sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(resume)
    }

    async fn list_resumes(&self, filter: ResumeFilter<'_>) -> Result<Vec<ResumeRow>, AppError> {
        let resumes = sqlx::query_as::<_, ResumeRow>(
            r#"
            SELECT * FROM resumes
            WHERE ($1::uuid IS NULL OR author = $1)
              AND ($2::text IS NULL OR field = $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(filter.author)
        .bind(filter.field)
        .fetch_all(&self.pool)
        .await?;
        Ok(resumes)
    }

    async fn update_resume(&self, resume: &ResumeRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE resumes
            SET field = $1, work = $2, school = $3, initial_rating = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&resume.field)
        .bind(&resume.work)
        .bind(&resume.school)
        .bind(resume.initial_rating)
        .bind(resume.updated_at)
        .bind(resume.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_resume(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_post(&self, post: &PostRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO posts
                (id, author, title, content, audience, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(post.id)
        .bind(post.author)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.audience)
        .bind(&post.tags)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<PostRow>, AppError> {
        let post = sqlx::query_as::<_, PostRow>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn list_posts(&self, author: Option<Uuid>) -> Result<Vec<PostRow>, AppError> {
        let posts = sqlx::query_as::<_, PostRow>(
            "SELECT * FROM posts WHERE ($1::uuid IS NULL OR author = $1) ORDER BY created_at, id",
        )
        .bind(author)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn list_posts_by_ids(&self, ids: &[Uuid]) -> Result<Vec<PostRow>, AppError> {
        let posts = sqlx::query_as::<_, PostRow>(
            "SELECT * FROM posts WHERE id = ANY($1) ORDER BY created_at, id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_from_audiences(&self, member: Uuid) -> Result<u64, AppError> {
        let member = member.to_string();
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET audience = array_remove(audience, $1), updated_at = now()
            WHERE $1 = ANY(audience)
            "#,
        )
        .bind(member)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_annotation(&self, note: &AnnotationRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO annotations
                (id, original, author, comment, quote, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(note.id)
        .bind(note.original)
        .bind(note.author)
        .bind(&note.comment)
        .bind(&note.quote)
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_annotation(&self, id: Uuid) -> Result<Option<AnnotationRow>, AppError> {
        let note = sqlx::query_as::<_, AnnotationRow>("SELECT * FROM annotations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(note)
    }

    async fn list_annotations_for_post(&self, post: Uuid) -> Result<Vec<AnnotationRow>, AppError> {
        let notes = sqlx::query_as::<_, AnnotationRow>(
            "SELECT * FROM annotations WHERE original = $1 ORDER BY created_at, id",
        )
        .bind(post)
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    async fn list_annotations_by_author(
        &self,
        author: Uuid,
    ) -> Result<Vec<AnnotationRow>, AppError> {
        let notes = sqlx::query_as::<_, AnnotationRow>(
            "SELECT * FROM annotations WHERE author = $1 ORDER BY created_at, id",
        )
        .bind(author)
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    async fn count_annotations_by_author(&self, author: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM annotations WHERE author = $1")
            .bind(author)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_annotation(&self, note: &AnnotationRow) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE annotations SET comment = $1, quote = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(&note.comment)
        .bind(&note.quote)
        .bind(note.updated_at)
        .bind(note.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_annotation(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_validation(&self, validation: &ValidationRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO validations
                (id, kind, object_id, have_validated, have_refuted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (kind, object_id) DO NOTHING
            "#,
        )
        .bind(validation.id)
        .bind(&validation.kind)
        .bind(validation.object_id)
        .bind(&validation.have_validated)
        .bind(&validation.have_refuted)
        .bind(validation.created_at)
        .bind(validation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_validation(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
    ) -> Result<Option<ValidationRow>, AppError> {
        let validation = sqlx::query_as::<_, ValidationRow>(
            "SELECT * FROM validations WHERE kind = $1 AND object_id = $2",
        )
        .bind(kind.as_str())
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(validation)
    }

    async fn list_validations(
        &self,
        kind: ValidationKind,
        object_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ValidationRow>, AppError> {
        let validations = sqlx::query_as::<_, ValidationRow>(
            r#"
            SELECT * FROM validations
            WHERE kind = $1 AND ($2::uuid[] IS NULL OR object_id = ANY($2))
            ORDER BY created_at, id
            "#,
        )
        .bind(kind.as_str())
        .bind(object_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(validations)
    }

    async fn apply_vote(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
        voter: Uuid,
        vote: Vote,
    ) -> Result<bool, AppError> {
        let statement = match vote {
            Vote::Approve => APPROVE_VOTE,
            Vote::Refute => REFUTE_VOTE,
            Vote::Undo => UNDO_VOTE,
        };
        let result = sqlx::query(statement)
            .bind(kind.as_str())
            .bind(object_id)
            .bind(voter)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Nothing matched: work out which guard failed.
        let record = self
            .get_validation(kind, object_id)
            .await?
            .ok_or_else(|| missing_validation(object_id))?;
        match vote {
            Vote::Undo => Ok(false),
            _ if record.has_voted(voter) => {
                Err(AppError::not_allowed("Can't vote on object twice"))
            }
            _ => Err(AppError::Unauthenticated),
        }
    }

    async fn delete_validation(
        &self,
        kind: ValidationKind,
        object_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM validations WHERE kind = $1 AND object_id = $2")
            .bind(kind.as_str())
            .bind(object_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn retract_votes(&self, voter: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE validations
            SET have_validated = array_remove(have_validated, $1),
                have_refuted = array_remove(have_refuted, $1),
                updated_at = now()
            WHERE $1 = ANY(have_validated) OR $1 = ANY(have_refuted)
            "#,
        )
        .bind(voter)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_map(&self, map: &DependencyMapRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO dependency_maps
                (id, author, title, tags, deps, all_items, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(map.id)
        .bind(map.author)
        .bind(&map.title)
        .bind(&map.tags)
        .bind(&map.deps)
        .bind(&map.all_items)
        .bind(map.created_at)
        .bind(map.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_map(&self, id: Uuid) -> Result<Option<DependencyMapRow>, AppError> {
        let map =
            sqlx::query_as::<_, DependencyMapRow>("SELECT * FROM dependency_maps WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(map)
    }

    async fn list_maps(&self, author: Option<Uuid>) -> Result<Vec<DependencyMapRow>, AppError> {
        let maps = sqlx::query_as::<_, DependencyMapRow>(
            r#"
            SELECT * FROM dependency_maps
            WHERE ($1::uuid IS NULL OR author = $1)
            ORDER BY created_at, id
            "#,
        )
        .bind(author)
        .fetch_all(&self.pool)
        .await?;
        Ok(maps)
    }

    async fn update_map(&self, map: &DependencyMapRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE dependency_maps
            SET title = $1, tags = $2, deps = $3, all_items = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&map.title)
        .bind(&map.tags)
        .bind(&map.deps)
        .bind(&map.all_items)
        .bind(map.updated_at)
        .bind(map.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_map(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM dependency_maps WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_code() {
        assert!(is_unique_violation(Some("23505")));
        assert!(!is_unique_violation(Some("23503")));
        assert!(!is_unique_violation(None));
    }

    #[test]
    fn test_other_errors_stay_database_errors() {
        let err = username_conflict(sqlx::Error::RowNotFound, "amanda");
        assert!(matches!(err, AppError::Database(_)));
    }
}
