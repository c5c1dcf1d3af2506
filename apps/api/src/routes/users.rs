//! Accounts and login sessions.

use axum::{
    extract::{Path, State},
    http::header::SET_COOKIE,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::models::{UserRow, ValidationKind};
use crate::password::{hash_password, verify_password};
use crate::routes::{lookup, Message};
use crate::session::{expired_cookie, session_cookie, Session};
use crate::state::AppState;
use crate::store::ResumeFilter;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub update: UserUpdate,
}

#[derive(Debug, Serialize)]
pub struct CreatedUser {
    pub msg: String,
    pub user: UserRow,
}

/// GET /api/session
pub async fn handle_get_session(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<UserRow>, AppError> {
    let user = session.user()?;
    Ok(Json(lookup::user_by_id(state.store.as_ref(), user).await?))
}

/// GET /api/users
pub async fn handle_list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserRow>>, AppError> {
    Ok(Json(state.store.list_users().await?))
}

/// GET /api/users/:username
pub async fn handle_get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserRow>, AppError> {
    Ok(Json(
        lookup::user_by_username(state.store.as_ref(), &username).await?,
    ))
}

/// POST /api/users
pub async fn handle_create_user(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<Credentials>,
) -> Result<Json<CreatedUser>, AppError> {
    session.ensure_logged_out()?;
    let username = lookup::require_non_empty(&req.username, "Username")?;
    if req.password.is_empty() {
        return Err(AppError::bad_values("Username and password must be non-empty!"));
    }
    ensure_username_free(&state, &username).await?;

    let user = UserRow::new(username, hash_password(&req.password));
    state.store.insert_user(&user).await?;
    info!("Created user {} ({})", user.username, user.id);

    Ok(Json(CreatedUser {
        msg: "User created successfully!".to_string(),
        user,
    }))
}

/// PATCH /api/users
pub async fn handle_update_user(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<Message>, AppError> {
    let user_id = session.user()?;
    let mut user = lookup::user_by_id(state.store.as_ref(), user_id).await?;

    if let Some(username) = req.update.username {
        let username = lookup::require_non_empty(&username, "Username")?;
        if username != user.username {
            ensure_username_free(&state, &username).await?;
            user.username = username;
        }
    }
    if let Some(password) = req.update.password {
        if password.is_empty() {
            return Err(AppError::bad_values("Password can't be empty"));
        }
        user.password_hash = hash_password(&password);
    }
    user.updated_at = Utc::now();
    state.store.update_user(&user).await?;
    info!("Updated user {}", user.id);

    Ok(Message::json("Updated user successfully!"))
}

/// DELETE /api/users
///
/// Removes the caller together with everything they authored, retracts their
/// votes everywhere and takes them out of every post audience.
pub async fn handle_delete_user(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();

    for post in store.list_posts(Some(user)).await? {
        store.delete_post(post.id).await?;
        store.delete_validation(ValidationKind::Post, post.id).await?;
    }
    let resumes = store
        .list_resumes(ResumeFilter {
            author: Some(user),
            field: None,
        })
        .await?;
    for resume in resumes {
        store.delete_resume(resume.id).await?;
        store
            .delete_validation(ValidationKind::Resume, resume.id)
            .await?;
    }
    for note in store.list_annotations_by_author(user).await? {
        store.delete_annotation(note.id).await?;
    }
    for map in store.list_maps(Some(user)).await? {
        store.delete_map(map.id).await?;
        store.delete_validation(ValidationKind::Map, map.id).await?;
    }

    // The account goes first: from then on new votes by `user` are refused,
    // and the retraction below catches any that landed before.
    let sessions = state.sessions.end_all_for(user).await;
    store.delete_user(user).await?;
    let retracted = store.retract_votes(user).await?;
    let audiences = store.remove_from_audiences(user).await?;
    info!(
        "Deleted user {user}: retracted {retracted} votes, left {audiences} audiences, closed {sessions} sessions"
    );

    Ok((
        [(SET_COOKIE, expired_cookie(&state.config.session_cookie_name))],
        Message::json("User deleted successfully!"),
    ))
}

/// POST /api/login
pub async fn handle_login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .find_user_by_username(req.username.trim())
        .await?
        .filter(|user| verify_password(&req.password, &user.password_hash))
        .ok_or_else(|| AppError::not_allowed("Username or password is incorrect."))?;

    if let Some(old) = session.token {
        state.sessions.end(old).await;
    }
    let token = state.sessions.start(user.id).await;
    info!("User {} logged in", user.id);

    Ok((
        [(
            SET_COOKIE,
            session_cookie(&state.config.session_cookie_name, token),
        )],
        Message::json("Logged in!"),
    ))
}

/// POST /api/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, AppError> {
    session.user()?;
    if let Some(token) = session.token {
        state.sessions.end(token).await;
    }
    Ok((
        [(SET_COOKIE, expired_cookie(&state.config.session_cookie_name))],
        Message::json("Logged out!"),
    ))
}

async fn ensure_username_free(state: &AppState, username: &str) -> Result<(), AppError> {
    if state.store.find_user_by_username(username).await?.is_some() {
        return Err(AppError::not_allowed(format!(
            "User with username {username} already exists!"
        )));
    }
    Ok(())
}
