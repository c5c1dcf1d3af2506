pub mod annotation;
pub mod depmap;
pub mod health;
pub mod lookup;
pub mod posts;
pub mod resume;
pub mod users;
pub mod validation;

#[cfg(test)]
pub mod test_support;

use axum::{
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Serialize;

use crate::state::AppState;

/// Body of every mutation that has nothing else to return.
#[derive(Debug, Serialize)]
pub struct Message {
    pub msg: String,
}

impl Message {
    pub fn json(msg: impl Into<String>) -> Json<Message> {
        Json(Message { msg: msg.into() })
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        // Accounts
        .route("/api/session", get(users::handle_get_session))
        .route("/api/login", post(users::handle_login))
        .route("/api/logout", post(users::handle_logout))
        .route(
            "/api/users",
            get(users::handle_list_users)
                .post(users::handle_create_user)
                .patch(users::handle_update_user)
                .delete(users::handle_delete_user),
        )
        .route("/api/users/:username", get(users::handle_get_user))
        // Resumes
        .route(
            "/api/resume",
            get(resume::handle_list_resumes)
                .post(resume::handle_create_resume)
                .patch(resume::handle_update_resume),
        )
        .route("/api/resume/filter", get(resume::handle_filter_resumes))
        .route(
            "/api/resume/:id",
            get(resume::handle_resumes_by_user).delete(resume::handle_delete_resume),
        )
        // Exclusive posts
        .route(
            "/api/exclusivepost",
            get(posts::handle_viewable_posts).post(posts::handle_create_post),
        )
        .route(
            "/api/exclusivepost/author/:username",
            get(posts::handle_viewable_posts_by_author),
        )
        .route(
            "/api/exclusivepost/:id",
            get(posts::handle_get_post).delete(posts::handle_delete_post),
        )
        // Annotations
        .route(
            "/api/annotation",
            patch(annotation::handle_update_annotation),
        )
        .route(
            "/api/annotation/exclusivepost",
            post(annotation::handle_create_annotation),
        )
        .route(
            "/api/annotation/exclusivepost/:postId",
            get(annotation::handle_post_annotations),
        )
        .route(
            "/api/annotation/myAnnotations",
            get(annotation::handle_my_annotations),
        )
        .route(
            "/api/annotation/topReviewers/:top",
            get(annotation::handle_top_reviewers),
        )
        .route(
            "/api/annotation/:id",
            delete(annotation::handle_delete_annotation),
        )
        // Resume and post votes
        .route(
            "/api/validation/resume/:id",
            get(validation::handle_resume_votes),
        )
        .route(
            "/api/validation/approval/resume/:id",
            patch(validation::handle_approve_resume),
        )
        .route(
            "/api/validation/disapproval/resume/:id",
            patch(validation::handle_refute_resume),
        )
        .route(
            "/api/validation/undoValidation/resume/:id",
            patch(validation::handle_undo_resume),
        )
        .route(
            "/api/validation/exclusivepost/:id",
            get(validation::handle_post_votes),
        )
        .route(
            "/api/validation/approval/exclusivepost/:id",
            get(validation::handle_post_approver_credentials).patch(validation::handle_approve_post),
        )
        .route(
            "/api/validation/disapproval/exclusivepost/:id",
            get(validation::handle_post_disapprover_credentials)
                .patch(validation::handle_refute_post),
        )
        .route(
            "/api/validation/undoValidation/exclusivepost/:id",
            patch(validation::handle_undo_post),
        );

    if state.config.enable_dependency_maps {
        router = router.merge(dependency_map_routes());
    }

    router.with_state(state)
}

fn dependency_map_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/depmap",
            get(depmap::handle_list_maps)
                .post(depmap::handle_create_map)
                .patch(depmap::handle_update_map),
        )
        .route(
            "/api/depmap/:id",
            get(depmap::handle_get_map).delete(depmap::handle_delete_map),
        )
        .route(
            "/api/depmap/search/topics/:topic",
            get(depmap::handle_maps_by_topic),
        )
        .route(
            "/api/depmap/postprerequisite/:postId",
            get(depmap::handle_maps_requiring_post),
        )
        .route(
            "/api/users/depmap/viewableMaps",
            get(depmap::handle_viewable_maps),
        )
        .route("/api/validation/depmap", get(validation::handle_all_map_votes))
        .route(
            "/api/validation/depmap/popular",
            get(validation::handle_popular_maps),
        )
        .route(
            "/api/validation/depmap/:id",
            get(validation::handle_map_votes),
        )
        .route(
            "/api/validation/approval/depmap/:id",
            patch(validation::handle_approve_map),
        )
        .route(
            "/api/validation/disapproval/depmap/:id",
            patch(validation::handle_refute_map),
        )
        .route(
            "/api/validation/undoValidation/depmap/:id",
            patch(validation::handle_undo_map),
        )
}
