//! In-process client for handler tests: builds the router over a fresh
//! in-memory store and drives it with `oneshot`.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;

pub struct TestApp {
    router: Router,
}

impl TestApp {
    /// Every route mounted, dependency maps included.
    pub fn new() -> Self {
        Self::with_config(Config {
            enable_dependency_maps: true,
            ..Config::default()
        })
    }

    pub fn without_dependency_maps() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            router: build_router(AppState::in_memory(config)),
        }
    }

    /// Creates the account and returns a logged-in `Cookie` header value.
    pub async fn signup(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/api/users",
                None,
                json!({"username": username, "password": password}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "signup failed: {body}");
        self.login(username, password).await
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let request = json_request(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": username, "password": password})),
        );
        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "login failed");
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request(Method::GET, uri, cookie, None)).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(json_request(Method::POST, uri, cookie, Some(body)))
            .await
    }

    pub async fn patch(&self, uri: &str, cookie: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(json_request(Method::PATCH, uri, cookie, Some(body)))
            .await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request(Method::DELETE, uri, cookie, None))
            .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

fn json_request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
