//! Approve / disapprove votes on resumes, posts and dependency maps.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{DependencyMapRow, PostRow, ResumeRow, ValidationKind, Vote};
use crate::rating::calculate_rating;
use crate::routes::{lookup, Message};
use crate::session::Session;
use crate::state::AppState;
use crate::store::{usernames_for, username_map, validations_by_object, ResumeFilter, Store};

#[derive(Debug, Serialize)]
pub struct ResumeVotes {
    pub rating: f64,
    pub resume: ResumeRow,
    pub approvals: Vec<String>,
    pub disapprovals: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PostVotes {
    pub author: String,
    pub rating: f64,
    pub post: PostRow,
    pub approvals: Vec<String>,
    pub disapprovals: Vec<String>,
}

/// A voter and their credential in one field.
#[derive(Debug, Serialize)]
pub struct VoterCredential {
    pub user: String,
    pub rating: f64,
}

#[derive(Debug, Serialize)]
pub struct FieldApprovers {
    pub field: String,
    pub approvers: Vec<VoterCredential>,
}

#[derive(Debug, Serialize)]
pub struct FieldDisapprovers {
    pub field: String,
    pub disapprovers: Vec<VoterCredential>,
}

#[derive(Debug, Serialize)]
pub struct MapVotes {
    pub author: String,
    pub map: DependencyMapRow,
    pub approvals: Vec<String>,
    pub disapprovals: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MapPopularity {
    pub author: String,
    pub map: DependencyMapRow,
    pub approve: usize,
    pub disapprove: usize,
}

/// Records `vote` by `voter` on the record of `object_id`.
pub async fn cast_vote(
    store: &dyn Store,
    kind: ValidationKind,
    object_id: Uuid,
    voter: Uuid,
    vote: Vote,
) -> Result<(), AppError> {
    if store.apply_vote(kind, object_id, voter, vote).await? {
        info!("User {voter} cast {vote:?} on {} {object_id}", kind.as_str());
    }
    Ok(())
}

fn vote_message(vote: Vote, what: &str, id: Uuid) -> Json<Message> {
    match vote {
        Vote::Approve => Message::json(format!("Successfully approved {what} {id}")),
        Vote::Refute => Message::json(format!("Successfully disapproved {what} {id}")),
        Vote::Undo => Message::json(format!("Cancelled vote on {what} {id}")),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resumes
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/validation/resume/:id
pub async fn handle_resume_votes(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeVotes>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let votes = lookup::validation(store, ValidationKind::Resume, id).await?;
    let resume = lookup::resume(store, id).await?;
    Ok(Json(ResumeVotes {
        rating: calculate_rating(resume.initial_rating, &votes),
        resume,
        approvals: usernames_for(store, &votes.have_validated).await?,
        disapprovals: usernames_for(store, &votes.have_refuted).await?,
    }))
}

async fn vote_resume(
    state: &AppState,
    session: Session,
    id: Uuid,
    vote: Vote,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    cast_vote(state.store.as_ref(), ValidationKind::Resume, id, user, vote).await?;
    Ok(vote_message(vote, "resume", id))
}

/// PATCH /api/validation/approval/resume/:id
pub async fn handle_approve_resume(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_resume(&state, session, id, Vote::Approve).await
}

/// PATCH /api/validation/disapproval/resume/:id
pub async fn handle_refute_resume(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_resume(&state, session, id, Vote::Refute).await
}

/// PATCH /api/validation/undoValidation/resume/:id
pub async fn handle_undo_resume(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_resume(&state, session, id, Vote::Undo).await
}

// ────────────────────────────────────────────────────────────────────────────
// Exclusive posts
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/validation/exclusivepost/:id
pub async fn handle_post_votes(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<PostVotes>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let post = lookup::viewable_post(store, id, user).await?;
    let author = lookup::user_by_id(store, post.author).await?;
    let votes = lookup::validation(store, ValidationKind::Post, id).await?;
    Ok(Json(PostVotes {
        author: author.username,
        rating: lookup::post_rating(store, &post, &votes).await?,
        approvals: usernames_for(store, &votes.have_validated).await?,
        disapprovals: usernames_for(store, &votes.have_refuted).await?,
        post,
    }))
}

/// GET /api/validation/approval/exclusivepost/:id
pub async fn handle_post_approver_credentials(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FieldApprovers>>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let post = lookup::viewable_post(store, id, user).await?;
    let votes = lookup::validation(store, ValidationKind::Post, id).await?;
    let per_field = voter_credentials(store, &post.tags, &votes.have_validated).await?;
    Ok(Json(
        per_field
            .into_iter()
            .map(|(field, approvers)| FieldApprovers { field, approvers })
            .collect(),
    ))
}

/// GET /api/validation/disapproval/exclusivepost/:id
pub async fn handle_post_disapprover_credentials(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FieldDisapprovers>>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let post = lookup::viewable_post(store, id, user).await?;
    let votes = lookup::validation(store, ValidationKind::Post, id).await?;
    let per_field = voter_credentials(store, &post.tags, &votes.have_refuted).await?;
    Ok(Json(
        per_field
            .into_iter()
            .map(|(field, disapprovers)| FieldDisapprovers {
                field,
                disapprovers,
            })
            .collect(),
    ))
}

/// For every tag, each voter's rating in that field (0 without a resume there).
async fn voter_credentials(
    store: &dyn Store,
    tags: &[String],
    voters: &[Uuid],
) -> Result<Vec<(String, Vec<VoterCredential>)>, AppError> {
    let names = username_map(store, voters).await?;
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let mut credentials = Vec::with_capacity(voters.len());
        for voter in voters {
            let Some(name) = names.get(voter) else {
                continue;
            };
            let resume = store
                .list_resumes(ResumeFilter {
                    author: Some(*voter),
                    field: Some(tag),
                })
                .await?
                .into_iter()
                .next();
            let rating = match resume {
                Some(resume) => lookup::resume_rating(store, &resume).await?,
                None => 0.0,
            };
            credentials.push(VoterCredential {
                user: name.clone(),
                rating,
            });
        }
        out.push((tag.clone(), credentials));
    }
    Ok(out)
}

async fn vote_post(
    state: &AppState,
    session: Session,
    id: Uuid,
    vote: Vote,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    lookup::viewable_post(store, id, user).await?;
    cast_vote(store, ValidationKind::Post, id, user, vote).await?;
    Ok(vote_message(vote, "post", id))
}

/// PATCH /api/validation/approval/exclusivepost/:id
pub async fn handle_approve_post(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_post(&state, session, id, Vote::Approve).await
}

/// PATCH /api/validation/disapproval/exclusivepost/:id
pub async fn handle_refute_post(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_post(&state, session, id, Vote::Refute).await
}

/// PATCH /api/validation/undoValidation/exclusivepost/:id
pub async fn handle_undo_post(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_post(&state, session, id, Vote::Undo).await
}

// ────────────────────────────────────────────────────────────────────────────
// Dependency maps
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/validation/depmap
pub async fn handle_all_map_votes(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<MapVotes>>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let maps = store.list_maps(None).await?;
    let ids: Vec<Uuid> = maps.iter().map(|m| m.id).collect();
    let authors: Vec<Uuid> = maps.iter().map(|m| m.author).collect();
    let votes = validations_by_object(store, ValidationKind::Map, &ids).await?;
    let names = username_map(store, &authors).await?;

    let mut out = Vec::with_capacity(maps.len());
    for map in maps {
        let (approvals, disapprovals) = match votes.get(&map.id) {
            Some(v) => (
                usernames_for(store, &v.have_validated).await?,
                usernames_for(store, &v.have_refuted).await?,
            ),
            None => (Vec::new(), Vec::new()),
        };
        out.push(MapVotes {
            author: names.get(&map.author).cloned().unwrap_or_default(),
            map,
            approvals,
            disapprovals,
        });
    }
    Ok(Json(out))
}

/// GET /api/validation/depmap/popular
///
/// Most approvals first; among equals, fewest disapprovals first.
pub async fn handle_popular_maps(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<MapPopularity>>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let maps = store.list_maps(None).await?;
    let ids: Vec<Uuid> = maps.iter().map(|m| m.id).collect();
    let authors: Vec<Uuid> = maps.iter().map(|m| m.author).collect();
    let votes = validations_by_object(store, ValidationKind::Map, &ids).await?;
    let names = username_map(store, &authors).await?;

    let mut ranked: Vec<MapPopularity> = maps
        .into_iter()
        .map(|map| {
            let (approve, disapprove) = votes
                .get(&map.id)
                .map_or((0, 0), |v| (v.approvals(), v.disapprovals()));
            MapPopularity {
                author: names.get(&map.author).cloned().unwrap_or_default(),
                map,
                approve,
                disapprove,
            }
        })
        .collect();
    sort_by_popularity(&mut ranked);
    Ok(Json(ranked))
}

fn sort_by_popularity(ranked: &mut [MapPopularity]) {
    ranked.sort_by(|a, b| {
        b.approve
            .cmp(&a.approve)
            .then(a.disapprove.cmp(&b.disapprove))
    });
}

/// GET /api/validation/depmap/:id
pub async fn handle_map_votes(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<MapVotes>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let map = lookup::map(store, id).await?;
    let author = lookup::user_by_id(store, map.author).await?;
    let votes = lookup::validation(store, ValidationKind::Map, id).await?;
    Ok(Json(MapVotes {
        author: author.username,
        map,
        approvals: usernames_for(store, &votes.have_validated).await?,
        disapprovals: usernames_for(store, &votes.have_refuted).await?,
    }))
}

async fn vote_map(
    state: &AppState,
    session: Session,
    id: Uuid,
    vote: Vote,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    cast_vote(state.store.as_ref(), ValidationKind::Map, id, user, vote).await?;
    Ok(vote_message(vote, "map", id))
}

/// PATCH /api/validation/approval/depmap/:id
pub async fn handle_approve_map(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_map(&state, session, id, Vote::Approve).await
}

/// PATCH /api/validation/disapproval/depmap/:id
pub async fn handle_refute_map(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_map(&state, session, id, Vote::Refute).await
}

/// PATCH /api/validation/undoValidation/depmap/:id
pub async fn handle_undo_map(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    vote_map(&state, session, id, Vote::Undo).await
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::models::Deps;
    use crate::routes::test_support::TestApp;

    async fn resume_of(app: &TestApp, cookie: &str, field: &str, work: &[&str]) -> String {
        let (_, body) = app
            .post(
                "/api/resume",
                Some(cookie),
                json!({"work": work, "school": [], "field": field}),
            )
            .await;
        body["resume"]["_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_resume_votes_move_rating() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let bo = app.signup("bo", "pw").await;
        let id = resume_of(&app, &amanda, "bio", &["lab"]).await;

        app.patch(&format!("/api/validation/approval/resume/{id}"), Some(&flora), json!({}))
            .await;
        app.patch(&format!("/api/validation/approval/resume/{id}"), Some(&bo), json!({}))
            .await;

        let (_, body) = app
            .get(&format!("/api/validation/resume/{id}"), Some(&amanda))
            .await;
        assert!((body["rating"].as_f64().unwrap() - 1.2).abs() < 1e-9);
        assert_eq!(body["approvals"], json!(["flora", "bo"]));
        assert_eq!(body["disapprovals"], json!([]));
    }

    #[tokio::test]
    async fn test_double_vote_rejected_until_undone() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let id = resume_of(&app, &amanda, "bio", &[]).await;

        let approve = format!("/api/validation/approval/resume/{id}");
        let refute = format!("/api/validation/disapproval/resume/{id}");
        let undo = format!("/api/validation/undoValidation/resume/{id}");

        let (status, _) = app.patch(&approve, Some(&flora), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.patch(&refute, Some(&flora), json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.patch(&undo, Some(&flora), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.patch(&undo, Some(&flora), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.patch(&refute, Some(&flora), json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app
            .get(&format!("/api/validation/resume/{id}"), Some(&amanda))
            .await;
        assert_eq!(body["rating"], 0.0);
        assert_eq!(body["disapprovals"], json!(["flora"]));
    }

    #[tokio::test]
    async fn test_vote_on_unknown_object() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let (status, _) = app
            .patch(
                &format!("/api/validation/approval/resume/{}", Uuid::new_v4()),
                Some(&amanda),
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_votes_need_access() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let bo = app.signup("bo", "pw").await;
        let (_, created) = app
            .post(
                "/api/exclusivepost",
                Some(&amanda),
                json!({"title": "t", "content": "c", "audience": ["flora"], "tags": ["bio"]}),
            )
            .await;
        let id = created["post"]["_id"].as_str().unwrap().to_string();

        let (status, _) = app
            .patch(&format!("/api/validation/approval/exclusivepost/{id}"), Some(&bo), json!({}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .patch(&format!("/api/validation/approval/exclusivepost/{id}"), Some(&flora), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app
            .get(&format!("/api/validation/exclusivepost/{id}"), Some(&amanda))
            .await;
        assert_eq!(body["author"], "amanda");
        assert_eq!(body["approvals"], json!(["flora"]));
        assert!((body["rating"].as_f64().unwrap() - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_approver_credentials_per_tag() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        resume_of(&app, &flora, "bio", &["lab", "urop"]).await;
        let (_, created) = app
            .post(
                "/api/exclusivepost",
                Some(&amanda),
                json!({"title": "t", "content": "c", "audience": [""], "tags": ["bio", "art"]}),
            )
            .await;
        let id = created["post"]["_id"].as_str().unwrap().to_string();
        app.patch(&format!("/api/validation/approval/exclusivepost/{id}"), Some(&flora), json!({}))
            .await;

        let (status, body) = app
            .get(&format!("/api/validation/approval/exclusivepost/{id}"), Some(&amanda))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {"field": "bio", "approvers": [{"user": "flora", "rating": 2.0}]},
                {"field": "art", "approvers": [{"user": "flora", "rating": 0.0}]},
            ])
        );

        let (_, body) = app
            .get(&format!("/api/validation/disapproval/exclusivepost/{id}"), Some(&amanda))
            .await;
        assert_eq!(body[0]["disapprovers"], json!([]));
    }

    #[test]
    fn test_popularity_order() {
        let map = DependencyMapRow::new(Uuid::new_v4(), "m".into(), vec![], Deps::new());
        let entry = |approve, disapprove| MapPopularity {
            author: String::new(),
            map: map.clone(),
            approve,
            disapprove,
        };
        let mut ranked = vec![entry(1, 0), entry(3, 2), entry(3, 0), entry(0, 5)];
        sort_by_popularity(&mut ranked);
        let order: Vec<(usize, usize)> = ranked.iter().map(|r| (r.approve, r.disapprove)).collect();
        assert_eq!(order, vec![(3, 0), (3, 2), (1, 0), (0, 5)]);
    }
}
