//! Dependency maps: directed graphs over posts, prerequisite to postrequisite.

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
use crate::models::depmap::all_items;
use crate::models::{DependencyMapRow, Deps, ValidationKind, ValidationRow};
use crate::routes::{lookup, Message};
use crate::session::Session;
use crate::state::AppState;
use crate::store::{username_map, Store};

#[derive(Debug, Deserialize)]
pub struct CreateMapRequest {
    pub deps: Deps,
    #[serde(default)]
    pub tags: Vec<String>,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedMap {
    pub msg: String,
    pub map: DependencyMapRow,
}

#[derive(Debug, Serialize)]
pub struct AuthoredMap {
    pub author: String,
    pub map: DependencyMapRow,
}

#[derive(Debug, Default, Deserialize)]
pub struct MapUpdate {
    pub deps: Option<Deps>,
    pub tags: Option<Vec<String>>,
    pub title: Option<String>,
    pub author: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMapRequest {
    pub id: Uuid,
    pub update: MapUpdate,
}

/// POST /api/depmap
pub async fn handle_create_map(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateMapRequest>,
) -> Result<Json<CreatedMap>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let title = lookup::require_non_empty(&req.title, "Title")?;
    ensure_linkable(store, &req.deps, user).await?;

    let map = DependencyMapRow::new(user, title, lookup::clean_list(req.tags), req.deps);
    store.insert_map(&map).await?;
    store
        .insert_validation(&ValidationRow::new(ValidationKind::Map, map.id))
        .await?;
    info!(
        "User {user} created dependency map {} over {} post(s)",
        map.id,
        map.all_items.len()
    );

    Ok(Json(CreatedMap {
        msg: "Dependency map successfully created!".to_string(),
        map,
    }))
}

/// GET /api/depmap
pub async fn handle_list_maps(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<AuthoredMap>>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let maps = store.list_maps(None).await?;
    Ok(Json(with_authors(store, maps).await?))
}

/// GET /api/depmap/:id
pub async fn handle_get_map(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<AuthoredMap>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let map = lookup::map(store, id).await?;
    let author = lookup::user_by_id(store, map.author).await?;
    Ok(Json(AuthoredMap {
        author: author.username,
        map,
    }))
}

/// GET /api/depmap/search/topics/:topic
pub async fn handle_maps_by_topic(
    State(state): State<AppState>,
    session: Session,
    Path(topic): Path<String>,
) -> Result<Json<Vec<AuthoredMap>>, AppError> {
    session.user()?;
    let store = state.store.as_ref();
    let topic = topic.trim();
    let maps = store
        .list_maps(None)
        .await?
        .into_iter()
        .filter(|map| map.tags.iter().any(|tag| tag == topic))
        .collect();
    Ok(Json(with_authors(store, maps).await?))
}

/// GET /api/depmap/postprerequisite/:postId
///
/// Maps in which the post depends on something else.
pub async fn handle_maps_requiring_post(
    State(state): State<AppState>,
    session: Session,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<AuthoredMap>>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    lookup::viewable_post(store, post_id, user).await?;
    let maps = store
        .list_maps(None)
        .await?
        .into_iter()
        .filter(|map| map.postrequisites().contains(&post_id))
        .collect();
    Ok(Json(with_authors(store, maps).await?))
}

/// GET /api/users/depmap/viewableMaps
///
/// Maps whose every remaining post the caller may read.
pub async fn handle_viewable_maps(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<AuthoredMap>>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let mut visible = Vec::new();
    for map in store.list_maps(None).await? {
        let posts = store.list_posts_by_ids(&map.all_items).await?;
        if posts.iter().all(|post| can_view(post, user)) {
            visible.push(map);
        }
    }
    Ok(Json(with_authors(store, visible).await?))
}

/// PATCH /api/depmap
pub async fn handle_update_map(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UpdateMapRequest>,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let mut map = lookup::map(store, req.id).await?;
    lookup::ensure_author(map.author, user, "dependency map", map.id)?;

    let update = req.update;
    if update.author.is_some() {
        return Err(AppError::not_allowed("Cannot Update Author"));
    }
    if let Some(title) = update.title {
        map.title = lookup::require_non_empty(&title, "Title")?;
    }
    if let Some(tags) = update.tags {
        map.tags = lookup::clean_list(tags);
    }
    if let Some(deps) = update.deps {
        ensure_linkable(store, &deps, user).await?;
        map.set_deps(deps);
    }
    map.updated_at = Utc::now();
    store.update_map(&map).await?;
    info!("User {user} updated dependency map {}", map.id);

    Ok(Message::json("Dependency map successfully updated!"))
}

/// DELETE /api/depmap/:id
pub async fn handle_delete_map(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, AppError> {
    let user = session.user()?;
    let store = state.store.as_ref();
    let map = lookup::map(store, id).await?;
    lookup::ensure_author(map.author, user, "dependency map", id)?;
    store.delete_map(id).await?;
    store.delete_validation(ValidationKind::Map, id).await?;
    info!("User {user} deleted dependency map {id}");
    Ok(Message::json("Dependency map deleted successfully!"))
}

/// Every post the graph mentions must exist and be readable by `author`.
async fn ensure_linkable(store: &dyn Store, deps: &Deps, author: Uuid) -> Result<(), AppError> {
    if deps.is_empty() {
        return Err(AppError::bad_values("Dependency map must link at least one post"));
    }
    let ids = all_items(deps);
    let posts = store.list_posts_by_ids(&ids).await?;
    if posts.len() != ids.len() {
        return Err(AppError::bad_values("postIds for dependency map not found"));
    }
    if !posts.iter().all(|post| can_view(post, author)) {
        return Err(AppError::bad_values("No access to view and link posts in map"));
    }
    Ok(())
}

async fn with_authors(
    store: &dyn Store,
    maps: Vec<DependencyMapRow>,
) -> Result<Vec<AuthoredMap>, AppError> {
    let authors: Vec<Uuid> = maps.iter().map(|m| m.author).collect();
    let names = username_map(store, &authors).await?;
    Ok(maps
        .into_iter()
        .map(|map| AuthoredMap {
            author: names.get(&map.author).cloned().unwrap_or_default(),
            map,
        })
        .collect())
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
                json!({"title": "Step", "content": "Do the thing", "audience": audience, "tags": []}),
            )
            .await;
        created["post"]["_id"].as_str().unwrap().to_string()
    }

    async fn map_of(app: &TestApp, cookie: &str, deps: Value, tags: Value) -> (StatusCode, Value) {
        app.post(
            "/api/depmap",
            Some(cookie),
            json!({"deps": deps, "tags": tags, "title": "Learning path"}),
        )
        .await
    }

    #[tokio::test]
    async fn test_create_and_fetch_map() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let a = post_for(&app, &amanda, json!([""])).await;
        let b = post_for(&app, &amanda, json!([""])).await;

        let (status, created) = map_of(&app, &amanda, json!({ &a: [&b] }), json!(["bio"])).await;
        assert_eq!(status, StatusCode::OK, "{created}");
        assert_eq!(created["map"]["allItems"].as_array().unwrap().len(), 2);
        let id = created["map"]["_id"].as_str().unwrap().to_string();

        let (status, body) = app.get(&format!("/api/depmap/{id}"), Some(&amanda)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["author"], "amanda");

        let (_, votes) = app
            .get(&format!("/api/validation/depmap/{id}"), Some(&amanda))
            .await;
        assert_eq!(votes["approvals"], json!([]));
    }

    #[tokio::test]
    async fn test_map_rejects_missing_and_hidden_posts() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let open = post_for(&app, &amanda, json!([""])).await;
        let private = post_for(&app, &amanda, json!([])).await;
        let ghost = Uuid::new_v4().to_string();

        let (status, body) = map_of(&app, &flora, json!({ &open: [&ghost] }), json!([])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "postIds for dependency map not found");

        let (status, body) = map_of(&app, &flora, json!({ &open: [&private] }), json!([])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "No access to view and link posts in map");

        let (status, _) = map_of(&app, &flora, json!({}), json!([])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_topic_and_prerequisite_search() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let a = post_for(&app, &amanda, json!([""])).await;
        let b = post_for(&app, &amanda, json!([""])).await;
        map_of(&app, &amanda, json!({ &a: [&b] }), json!(["bio"])).await;

        let (_, found) = app.get("/api/depmap/search/topics/bio", Some(&amanda)).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        let (_, found) = app.get("/api/depmap/search/topics/art", Some(&amanda)).await;
        assert_eq!(found, json!([]));

        let (_, found) = app
            .get(&format!("/api/depmap/postprerequisite/{b}"), Some(&amanda))
            .await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        let (_, found) = app
            .get(&format!("/api/depmap/postprerequisite/{a}"), Some(&amanda))
            .await;
        assert_eq!(found, json!([]));
    }

    #[tokio::test]
    async fn test_viewable_maps_hide_private_posts() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let open = post_for(&app, &amanda, json!([""])).await;
        let private = post_for(&app, &amanda, json!([])).await;
        map_of(&app, &amanda, json!({ &open: [&private] }), json!([])).await;

        let (_, mine) = app.get("/api/users/depmap/viewableMaps", Some(&amanda)).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);
        let (_, theirs) = app.get("/api/users/depmap/viewableMaps", Some(&flora)).await;
        assert_eq!(theirs, json!([]));
    }

    #[tokio::test]
    async fn test_update_and_delete_by_author_only() {
        let app = TestApp::new();
        let amanda = app.signup("amanda", "pw").await;
        let flora = app.signup("flora", "pw").await;
        let a = post_for(&app, &amanda, json!([""])).await;
        let b = post_for(&app, &amanda, json!([""])).await;
        let c = post_for(&app, &amanda, json!([""])).await;
        let (_, created) = map_of(&app, &amanda, json!({ &a: [&b] }), json!([])).await;
        let id = created["map"]["_id"].as_str().unwrap().to_string();

        let (status, _) = app
            .patch(
                "/api/depmap",
                Some(&flora),
                json!({"id": id, "update": {"title": "Mine"}}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .patch(
                "/api/depmap",
                Some(&amanda),
                json!({"id": id, "update": {"author": "flora"}}),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .patch(
                "/api/depmap",
                Some(&amanda),
                json!({"id": id, "update": {"deps": { &a: [&b, &c] }}}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app.get(&format!("/api/depmap/{id}"), Some(&amanda)).await;
        assert_eq!(body["map"]["allItems"].as_array().unwrap().len(), 3);

        let (status, _) = app.delete(&format!("/api/depmap/{id}"), Some(&flora)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.delete(&format!("/api/depmap/{id}"), Some(&amanda)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .get(&format!("/api/validation/depmap/{id}"), Some(&amanda))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_routes_absent_when_disabled() {
        let app = TestApp::without_dependency_maps();
        let amanda = app.signup("amanda", "pw").await;
        let (status, _) = app.get("/api/depmap", Some(&amanda)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
