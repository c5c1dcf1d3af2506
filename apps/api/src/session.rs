//! Cookie sessions.
//!
//! The cookie only carries an opaque random token; the token -> user mapping
//! lives server-side in `SessionStore`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Clone, Default)]
pub struct SessionStore {
    tokens: Arc<RwLock<HashMap<Uuid, Uuid>>>,
}

impl SessionStore {
    /// Opens a session for `user` and returns its token.
    pub async fn start(&self, user: Uuid) -> Uuid {
        let token = Uuid::new_v4();
        self.tokens.write().await.insert(token, user);
        token
    }

    pub async fn user_for(&self, token: Uuid) -> Option<Uuid> {
        self.tokens.read().await.get(&token).copied()
    }

    pub async fn end(&self, token: Uuid) {
        self.tokens.write().await.remove(&token);
    }

    /// Ends every session of `user`. Returns how many were open.
    pub async fn end_all_for(&self, user: Uuid) -> usize {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, owner| *owner != user);
        before - tokens.len()
    }
}

/// The caller's session, resolved from the cookie. Never rejects; handlers
/// decide whether a user is required.
#[derive(Debug, Clone, Copy, Default)]
pub struct Session {
    pub token: Option<Uuid>,
    pub user: Option<Uuid>,
}

impl Session {
    pub fn user(&self) -> Result<Uuid, AppError> {
        self.user.ok_or(AppError::Unauthenticated)
    }

    pub fn ensure_logged_out(&self) -> Result<(), AppError> {
        match self.user {
            Some(_) => Err(AppError::not_allowed("Must be logged out!")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let Some(token) = token_from_headers(&parts.headers, &state.config.session_cookie_name)
        else {
            return Ok(Session::default());
        };
        let user = state.sessions.user_for(token).await;
        Ok(Session {
            token: Some(token),
            user,
        })
    }
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(name: &str, token: Uuid) -> String {
    format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn token_from_headers(headers: &HeaderMap, name: &str) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_cookie_header() {
        let token = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; sid={token}; other=1")).unwrap(),
        );
        assert_eq!(token_from_headers(&headers, "sid"), Some(token));
        assert_eq!(token_from_headers(&headers, "missing"), None);
    }

    #[test]
    fn test_garbage_token_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sid=not-a-uuid"));
        assert_eq!(token_from_headers(&headers, "sid"), None);
    }

    #[tokio::test]
    async fn test_end_all_for_user() {
        let sessions = SessionStore::default();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let a1 = sessions.start(alice).await;
        sessions.start(alice).await;
        let b1 = sessions.start(bob).await;

        assert_eq!(sessions.end_all_for(alice).await, 2);
        assert_eq!(sessions.user_for(a1).await, None);
        assert_eq!(sessions.user_for(b1).await, Some(bob));
    }

    #[test]
    fn test_session_requirements() {
        let anon = Session::default();
        assert!(matches!(anon.user(), Err(AppError::Unauthenticated)));
        assert!(anon.ensure_logged_out().is_ok());

        let logged_in = Session {
            token: Some(Uuid::new_v4()),
            user: Some(Uuid::new_v4()),
        };
        assert!(logged_in.user().is_ok());
        assert!(logged_in.ensure_logged_out().is_err());
    }
}
