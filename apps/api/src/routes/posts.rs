//! Exclusive posts: readable only by their audience.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::audience::{filter_viewable, RequestedAudience, EVERYONE};
use crate::errors::AppError;
use crate::models::{PostRow, ResumeRow, ValidationKind, ValidationRow};
use crate::rating::{calculate_rating, field_base_rating};
use crate::routes::{lookup, Message};
use crate::session::Session;
use crate::state::AppState;
use crate::store::{username_map, validations_by_object, ResumeFilter, Store};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    /// Usernames; a `""` entry opens the post to everyone.
    pub audience: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedPost {
    pub msg: String,
    pub post: PostRow,
}

#[derive(Debug, Serialize)]
pub struct RatedPost {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub rating: f64,
    pub post: PostRow,
}

#[derive(Debug, Serialize)]
pub struct AuthorPosts {
    pub author: String,
    pub posts: Vec<RatedPost>,
}

/// POST /api/exclusivepost
pub async fn handle_create_post(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreatePostRequest>,
) -> Result<Json<CreatedPost>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let title = lookup::require_non_empty(&req.title, "Title")?;
    if req.content.trim().is_empty() {
        return Err(AppError::bad_values("Content can't be empty"));
    }

    let me = lookup::user_by_id(store, user).await?;
    let audience = match RequestedAudience::parse(&req.audience, &me.username) {
        RequestedAudience::Everyone => vec![EVERYONE.to_string()],
        RequestedAudience::Members(names) => {
            let mut ids = Vec::with_capacity(names.len());
            for name in &names {
                ids.push(lookup::user_by_username(store, name).await?.id.to_string());
            }
            ids
        }
    };

    let post = PostRow::new(
        user,
        title,
        req.content,
        audience,
        lookup::clean_list(req.tags),
    );
    store.insert_post(&post).await?;
    store
        .insert_validation(&ValidationRow::new(ValidationKind::Post, post.id))
        .await?;
    info!(
        "User {user} created post {} for {} audience member(s)",
        post.id,
        post.audience.len()
    );

    Ok(Json(CreatedPost {
        msg: "Post successfully created!".to_string(),
        post,
    }))
}

/// GET /api/exclusivepost
pub async fn handle_viewable_posts(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<RatedPost>>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let posts = filter_viewable(store.list_posts(None).await?, user);
    Ok(Json(rate_posts(store, posts, true).await?))
}

/// GET /api/exclusivepost/author/:username
pub async fn handle_viewable_posts_by_author(
    State(state): State<AppState>,
    session: Session,
    Path(username): Path<String>,
) -> Result<Json<AuthorPosts>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let author = lookup::user_by_username(store, &username).await?;
    let posts = filter_viewable(store.list_posts(Some(author.id)).await?, user);
    Ok(Json(AuthorPosts {
        author: author.username,
        posts: rate_posts(store, posts, false).await?,
    }))
}

/// GET /api/exclusivepost/:id
pub async fn handle_get_post(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<RatedPost>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let post = lookup::viewable_post(store, id, user).await?;
    let author = lookup::user_by_id(store, post.author).await?;
    let votes = lookup::validation_or_empty(store, ValidationKind::Post, id).await?;
    Ok(Json(RatedPost {
        author: Some(author.username),
        rating: lookup::post_rating(store, &post, &votes).await?,
        post,
    }))
}

/// DELETE /api/exclusivepost/:id
pub async fn handle_delete_post(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let post = store
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Cannot find post with id: {id}")))?;
    lookup::ensure_author(post.author, user, "post", id)?;

    store.delete_post(id).await?;
    store.delete_validation(ValidationKind::Post, id).await?;
    info!("User {user} deleted post {id}");

    Ok(Message::json("Post deleted successfully!"))
}

/// Rates each post from its author's resumes and its own votes.
async fn rate_posts(
    store: &dyn Store,
    posts: Vec<PostRow>,
    with_author: bool,
) -> Result<Vec<RatedPost>, AppError> {
    let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
    let authors: Vec<Uuid> = posts.iter().map(|p| p.author).collect();
    let votes = validations_by_object(store, ValidationKind::Post, &ids).await?;
    let names = username_map(store, &authors).await?;

    let mut resumes_by_author: HashMap<Uuid, Vec<ResumeRow>> = HashMap::new();
    for &author in &authors {
        if !resumes_by_author.contains_key(&author) {
            let resumes = store
                .list_resumes(ResumeFilter {
                    author: Some(author),
                    field: None,
                })
                .await?;
            resumes_by_author.insert(author, resumes);
        }
    }

    Ok(posts
        .into_iter()
        .map(|post| {
            let base = resumes_by_author
                .get(&post.author)
                .map_or(0.0, |resumes| field_base_rating(resumes, &post.tags));
            let rating = match votes.get(&post.id) {
                Some(v) => calculate_rating(base, v),
                None => base.max(0.0),
            };
            RatedPost {
                author: with_author
                    .then(|| names.get(&post.author).cloned())
                    .flatten(),
                rating,
                post,
            }
        })
        .collect())
}
