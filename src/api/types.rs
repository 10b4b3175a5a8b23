use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};

use crate::backend::AuthUser;
use crate::core_state::CoreState;

/// Cookie carrying the session token for browser navigation.
pub const SESSION_COOKIE: &str = "clinic_session";

/// Shared context for all API handlers and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    /// The signed-in user for these request headers, if any.
    pub fn current_user(&self, headers: &HeaderMap) -> Option<AuthUser> {
        session_token(headers).and_then(|token| self.core.auth.current_user(&token))
    }
}

/// Authenticated session, injected into request extensions by the auth
/// middleware.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: AuthUser,
    pub token: String,
}

/// Session token from `Authorization: Bearer`, falling back to the
/// session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// `Set-Cookie` header value that stores (or, with `None`, clears) the
/// session token.
pub fn session_cookie(token: Option<&str>) -> HeaderMap {
    let value = match token {
        Some(token) => format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"),
        None => format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    };
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(SET_COOKIE, value);
    }
    headers
}
