//! Annotations: comments anchored to a quote inside a post.

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::audience::can_view;
use crate::errors::AppError;
use crate::models::annotation::sort_by_recent_update;
use crate::models::{AnnotationRow, PostRow};
use crate::routes::{lookup, Message};
use crate::session::Session;
use crate::state::AppState;
use crate::store::username_map;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationRequest {
    pub post_id: Uuid,
    pub comment: String,
    pub quote: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedAnnotation {
    pub msg: String,
    pub annotation: AnnotationRow,
}

/// Editable fields. `author` and `original` are accepted only to be refused.
#[derive(Debug, Default, Deserialize)]
pub struct AnnotationUpdate {
    pub comment: Option<String>,
    pub quote: Option<String>,
    pub author: Option<Value>,
    pub original: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAnnotationRequest {
    pub id: Uuid,
    pub update: AnnotationUpdate,
}

/// Annotations grouped by post; `post` is null for posts that no longer exist.
#[derive(Debug, Serialize)]
pub struct PostAnnotations {
    pub post: Option<Value>,
    pub annotations: Vec<AnnotationRow>,
}

#[derive(Debug, Serialize)]
pub struct ReviewerCount {
    pub user: String,
    pub count: i64,
}

/// POST /api/annotation/exclusivepost
pub async fn handle_create_annotation(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateAnnotationRequest>,
) -> Result<Json<CreatedAnnotation>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let post = lookup::viewable_post(store, req.post_id, user).await?;
    if req.comment.trim().is_empty() || req.quote.is_empty() {
        return Err(AppError::bad_values("Annotation must have a comment and quote"));
    }
    ensure_quoted(&post, &req.quote)?;

    let note = AnnotationRow::new(post.id, user, req.comment, req.quote);
    store.insert_annotation(&note).await?;
    info!("User {user} annotated post {} ({})", post.id, note.id);

    Ok(Json(CreatedAnnotation {
        msg: "Annotation successfully created!".to_string(),
        annotation: note,
    }))
}

/// GET /api/annotation/exclusivepost/:postId
pub async fn handle_post_annotations(
    State(state): State<AppState>,
    session: Session,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<AnnotationRow>>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    lookup::viewable_post(store, post_id, user).await?;
    let mut notes = store.list_annotations_for_post(post_id).await?;
    sort_by_recent_update(&mut notes);
    Ok(Json(notes))
}

/// GET /api/annotation/myAnnotations
pub async fn handle_my_annotations(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<PostAnnotations>>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let notes = store.list_annotations_by_author(user).await?;

    let post_ids: Vec<Uuid> = notes
        .iter()
        .map(|n| n.original)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let posts = store.list_posts_by_ids(&post_ids).await?;
    let authors: Vec<Uuid> = posts.iter().map(|p| p.author).collect();
    let names = username_map(store, &authors).await?;

    let (mut live, mut orphaned): (Vec<AnnotationRow>, Vec<AnnotationRow>) = notes
        .into_iter()
        .partition(|n| posts.iter().any(|p| p.id == n.original));

    let mut groups = Vec::with_capacity(posts.len() + 1);
    for post in posts {
        let (mine, rest): (Vec<_>, Vec<_>) = live.into_iter().partition(|n| n.original == post.id);
        live = rest;
        // Lost access since annotating: the notes stay listed, the post does not.
        if !can_view(&post, user) {
            orphaned.extend(mine);
            continue;
        }
        let mut shown = serde_json::to_value(&post).map_err(anyhow::Error::from)?;
        shown["author"] = Value::String(names.get(&post.author).cloned().unwrap_or_default());
        groups.push(PostAnnotations {
            post: Some(shown),
            annotations: mine,
        });
    }
    groups.push(PostAnnotations {
        post: None,
        annotations: orphaned,
    });
    Ok(Json(groups))
}

/// PATCH /api/annotation
pub async fn handle_update_annotation(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UpdateAnnotationRequest>,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let mut note = lookup::annotation(store, req.id).await?;
    let post = lookup::viewable_post(store, note.original, user).await?;
    lookup::ensure_author(note.author, user, "annotation", note.id)?;

    let update = req.update;
    if update.author.is_some() {
        return Err(AppError::not_allowed("Cannot Update Author"));
    }
    if update.original.is_some() {
        return Err(AppError::not_allowed("Cannot Change the Annotation Target"));
    }
    if let Some(quote) = update.quote {
        if quote.is_empty() {
            return Err(AppError::bad_values("Annotation must have a comment and quote"));
        }
        ensure_quoted(&post, &quote)?;
        note.quote = quote;
    }
    if let Some(comment) = update.comment {
        if comment.trim().is_empty() {
            return Err(AppError::bad_values("Annotation must have a comment and quote"));
        }
        note.comment = comment;
    }
    note.updated_at = Utc::now();
    store.update_annotation(&note).await?;
    info!("User {user} updated annotation {}", note.id);

    Ok(Message::json("Annotation successfully updated!"))
}

/// DELETE /api/annotation/:id
pub async fn handle_delete_annotation(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let note = lookup::annotation(store, id).await?;
    lookup::ensure_author(note.author, user, "annotation", id)?;
    store.delete_annotation(id).await?;
    info!("User {user} deleted annotation {id}");
    Ok(Message::json("Annotation successfully deleted!"))
}

/// GET /api/annotation/topReviewers/:top
pub async fn handle_top_reviewers(
    State(state): State<AppState>,
    session: Session,
    Path(top): Path<String>,
) -> Result<Json<Vec<ReviewerCount>>, AppError> {
    session.user()?;
    let top = parse_top(&top)?;
    let store = state.store.as_ref();

    let mut counts = Vec::new();
    for user in store.list_users().await? {
        counts.push(ReviewerCount {
            count: store.count_annotations_by_author(user.id).await?,
            user: user.username,
        });
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(top);
    Ok(Json(counts))
}

fn parse_top(raw: &str) -> Result<usize, AppError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::bad_values("Expected a number"))?;
    if value.fract() != 0.0 || value <= 0.0 || !value.is_finite() {
        return Err(AppError::bad_values("Expected an integer greater than 0"));
    }
    Ok(value as usize)
}

fn ensure_quoted(post: &PostRow, quote: &str) -> Result<(), AppError> {
    if !post.content.contains(quote) {
        return Err(AppError::not_found("Quote not found in Post"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::routes::test_support::TestApp;

    async fn post_for(app: &TestApp, cookie: &str, audience: Value) -> String {
        let (_, created) = app
            .post(
                "/api/exclusivepost",
                Some(cookie),
                json!({"title": "Happiness", "content": "Life is good", "audience": audience, "tags": []}),
            )
            .await;
        created["post"]["_id"].as_str().unwrap().to_string()
    }

    async fn annotate(app: &TestApp, cookie: &str, post: &str, quote: &str) -> (StatusCode, Value) {
        app.post(
            "/api/annotation/exclusivepost",
            Some(cookie),
            json!({"postId": post, "comment": "This is really cool", "quote": quote}),
        )
        .await
    }

    #[test]
    fn test_parse_top() {
        assert_eq!(parse_top("3").unwrap(), 3);
        assert!(parse_top("0").is_err());
        assert!(parse_top("-2").is_err());
        assert!(parse_top("1.5").is_err());
        assert!(parse_top("many").is_err());
    }

    #[tokio::test]
    async fn test_quote_must_be_in_post() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let post = post_for(&app, &amanda, json!([""])).await;

        let (status, _) = annotate(&app, &amanda, &post, "Life is").await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = annotate(&app, &amanda, &post, "Death is").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Quote not found in Post");
    }

    #[tokio::test]
    async fn test_annotation_needs_post_access() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let bo = app.signup("bo", "pw").await;
        let post = post_for(&app, &amanda, json!([])).await;

        let (status, _) = annotate(&app, &bo, &post, "Life").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .get(&format!("/api/annotation/exclusivepost/{post}"), Some(&bo))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_listing_newest_update_first() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let post = post_for(&app, &amanda, json!([""])).await;
        let (_, first) = annotate(&app, &amanda, &post, "Life").await;
        annotate(&app, &amanda, &post, "good").await;
        let first_id = first["annotation"]["_id"].as_str().unwrap().to_string();

        let (status, _) = app
            .patch(
                "/api/annotation",
                Some(&amanda),
                json!({"id": first_id, "update": {"comment": "edited"}}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, notes) = app
            .get(&format!("/api/annotation/exclusivepost/{post}"), Some(&amanda))
            .await;
        assert_eq!(notes.as_array().unwrap().len(), 2);
        assert_eq!(notes[0]["comment"], "edited");
    }

    #[tokio::test]
    async fn test_update_rules() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let post = post_for(&app, &amanda, json!([""])).await;
        let (_, created) = annotate(&app, &amanda, &post, "Life").await;
        let id = created["annotation"]["_id"].as_str().unwrap().to_string();

        let (status, _) = app
            .patch(
                "/api/annotation",
                Some(&amanda),
                json!({"id": id, "update": {"quote": "nowhere"}}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .patch(
                "/api/annotation",
                Some(&amanda),
                json!({"id": id, "update": {"original": post}}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .patch(
                "/api/annotation",
                Some(&flora),
                json!({"id": id, "update": {"comment": "mine now"}}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.delete(&format!("/api/annotation/{id}"), Some(&flora)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.delete(&format!("/api/annotation/{id}"), Some(&amanda)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_my_annotations_grouped_with_orphans() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let kept = post_for(&app, &amanda, json!(["flora"])).await;
        let doomed = post_for(&app, &amanda, json!(["flora"])).await;
        annotate(&app, &flora, &kept, "Life").await;
        annotate(&app, &flora, &kept, "good").await;
        annotate(&app, &flora, &doomed, "is").await;
        app.delete(&format!("/api/exclusivepost/{doomed}"), Some(&amanda))
            .await;

        let (status, groups) = app.get("/api/annotation/myAnnotations", Some(&flora)).await;
        assert_eq!(status, StatusCode::OK);
        let groups = groups.as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["post"]["_id"], kept.as_str());
        assert_eq!(groups[0]["post"]["author"], "amanda");
        assert_eq!(groups[0]["annotations"].as_array().unwrap().len(), 2);
        assert!(groups[1]["post"].is_null());
        assert_eq!(groups[1]["annotations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_top_reviewers() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        app.signup("bo", "pw").await;
        let post = post_for(&app, &amanda, json!([""])).await;
        annotate(&app, &flora, &post, "Life").await;
        annotate(&app, &flora, &post, "good").await;
        annotate(&app, &amanda, &post, "is").await;

        let (status, top) = app.get("/api/annotation/topReviewers/2", Some(&amanda)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            top,
            json!([{"user": "flora", "count": 2}, {"user": "amanda", "count": 1}])
        );

        let (status, _) = app.get("/api/annotation/topReviewers/0", Some(&amanda)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
