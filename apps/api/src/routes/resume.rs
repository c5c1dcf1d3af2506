//! Resumes: per-field credentials with a crowd-adjusted rating.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{ResumeRow, ValidationKind, ValidationRow};
use crate::rating::calculate_rating;
use crate::routes::{lookup, Message};
use crate::session::Session;
use crate::state::AppState;
use crate::store::{username_map, validations_by_object, ResumeFilter, Store};

#[derive(Debug, Deserialize)]
pub struct CreateResumeRequest {
    pub work: Vec<String>,
    pub school: Vec<String>,
    pub field: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedResume {
    pub msg: String,
    pub resume: ResumeRow,
}

/// A resume with its current rating. `author` and `validation` are only
/// filled in by the endpoints that expose them.
#[derive(Debug, Serialize)]
pub struct RatedResume {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub rating: f64,
    pub resume: ResumeRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFilterQuery {
    pub username: Option<String>,
    pub field: Option<String>,
    /// Kept as text so a non-number can be reported as bad input.
    pub minimum_rating: Option<String>,
}

/// Editable fields. `author` and `initialRating` are accepted only to be refused.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeUpdate {
    pub field: Option<String>,
    pub work: Option<Vec<String>>,
    pub school: Option<Vec<String>>,
    pub author: Option<Value>,
    pub initial_rating: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateResumeRequest {
    pub id: Uuid,
    pub update: ResumeUpdate,
}

/// POST /api/resume
pub async fn handle_create_resume(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateResumeRequest>,
) -> Result<Json<CreatedResume>, AppError> {
    let user = session.user()?;
    let field = lookup::require_non_empty(&req.field, "Field")?;
    ensure_field_free(state.store.as_ref(), user, &field).await?;

    let work = entries(req.work, "work")?;
    let school = entries(req.school, "school")?;
    let resume = ResumeRow::new(user, field, work, school);
    state.store.insert_resume(&resume).await?;
    state
        .store
        .insert_validation(&ValidationRow::new(ValidationKind::Resume, resume.id))
        .await?;
    info!("User {user} created resume {} ({})", resume.id, resume.field);

    Ok(Json(CreatedResume {
        msg: "Resume Created Successfully!".to_string(),
        resume,
    }))
}

/// GET /api/resume
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<RatedResume>>, AppError> {
    session.user()?;
    let resumes = state.store.list_resumes(ResumeFilter::default()).await?;
    let rated = rate_resumes(state.store.as_ref(), resumes).await?;
    Ok(Json(
        rated
            .into_iter()
            .map(|r| RatedResume {
                author: None,
                validation: None,
                ..r
            })
            .collect(),
    ))
}

/// GET /api/resume/filter?username&field&minimumRating
pub async fn handle_filter_resumes(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ResumeFilterQuery>,
) -> Result<Json<Vec<RatedResume>>, AppError> {
    session.user()?;
    let store = state.store.as_ref();

    let minimum = match non_blank(query.minimum_rating.as_deref()) {
        Some(raw) => Some(
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| AppError::bad_values("Expected a number for minimum rating"))?,
        ),
        None => None,
    };
    let author = match non_blank(query.username.as_deref()) {
        Some(username) => Some(lookup::user_by_username(store, username).await?.id),
        None => None,
    };
    let filter = ResumeFilter {
        author,
        field: non_blank(query.field.as_deref()),
    };

    let resumes = store.list_resumes(filter).await?;
    let rated = rate_resumes(store, resumes).await?;
    Ok(Json(
        rated
            .into_iter()
            .filter(|r| minimum.map_or(true, |min| r.rating >= min))
            .collect(),
    ))
}

/// GET /api/resume/:username
pub async fn handle_resumes_by_user(
    State(state): State<AppState>,
    session: Session,
    Path(username): Path<String>,
) -> Result<Json<Vec<RatedResume>>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let author = lookup::user_by_username(store, &username).await?;
    let resumes = store
        .list_resumes(ResumeFilter {
            author: Some(author.id),
            field: None,
        })
        .await?;
    Ok(Json(rate_resumes(store, resumes).await?))
}

/// PATCH /api/resume
pub async fn handle_update_resume(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UpdateResumeRequest>,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let mut resume = lookup::resume(store, req.id).await?;
    lookup::ensure_author(resume.author, user, "resume", resume.id)?;

    let update = req.update;
    if update.author.is_some() {
        return Err(AppError::not_allowed("Not Allowed to edit author"));
    }
    if update.initial_rating.is_some() {
        return Err(AppError::not_allowed("Not Allowed to edit initialRating"));
    }
    if let Some(field) = update.field {
        let field = lookup::require_non_empty(&field, "Field")?;
        if field != resume.field {
            ensure_field_free(store, user, &field).await?;
            resume.field = field;
        }
    }
    if let Some(work) = update.work {
        resume.work = entries(work, "work")?;
    }
    if let Some(school) = update.school {
        resume.school = entries(school, "school")?;
    }
    resume.rederive_rating();
    resume.updated_at = Utc::now();
    store.update_resume(&resume).await?;
    info!("User {user} updated resume {}", resume.id);

    Ok(Message::json("Resume updated successfully!"))
}

/// DELETE /api/resume/:id
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let resume = lookup::resume(store, id).await?;
    lookup::ensure_author(resume.author, user, "resume", id)?;

    store.delete_resume(id).await?;
    store.delete_validation(ValidationKind::Resume, id).await?;
    info!("User {user} deleted resume {id}");

    Ok(Message::json("Resume successfully deleted!"))
}

/// Attaches author username, validation record and rating to each resume.
async fn rate_resumes(
    store: &dyn Store,
    resumes: Vec<ResumeRow>,
) -> Result<Vec<RatedResume>, AppError> {
    let ids: Vec<Uuid> = resumes.iter().map(|r| r.id).collect();
    let authors: Vec<Uuid> = resumes.iter().map(|r| r.author).collect();
    let mut votes = validations_by_object(store, ValidationKind::Resume, &ids).await?;
    let names = username_map(store, &authors).await?;

    Ok(resumes
        .into_iter()
        .map(|resume| {
            let validation = votes
                .remove(&resume.id)
                .unwrap_or_else(|| ValidationRow::empty(ValidationKind::Resume, resume.id));
            RatedResume {
                author: names.get(&resume.author).cloned(),
                rating: calculate_rating(resume.initial_rating, &validation),
                resume,
                validation: Some(validation),
            }
        })
        .collect())
}

async fn ensure_field_free(store: &dyn Store, author: Uuid, field: &str) -> Result<(), AppError> {
    let existing = store
        .list_resumes(ResumeFilter {
            author: Some(author),
            field: Some(field),
        })
        .await?;
    if !existing.is_empty() {
        return Err(AppError::bad_values(
            "A resume with this field already exists. Did you mean to update an existing resume?",
        ));
    }
    Ok(())
}

/// Trimmed entries. Each one counts toward the initial rating, so none may be blank.
fn entries(items: Vec<String>, name: &str) -> Result<Vec<String>, AppError> {
    items
        .into_iter()
        .map(|item| {
            let item = item.trim();
            if item.is_empty() {
                return Err(AppError::bad_values(format!("Blank {name} entry")));
            }
            Ok(item.to_string())
        })
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
