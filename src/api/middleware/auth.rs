//! Session authentication middleware.
//!
//! Resolves `Authorization: Bearer <token>` (or the session cookie) against
//! the auth service and injects `SessionContext` into request extensions
//! for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{session_token, ApiContext, SessionContext};

/// Require a live session.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_session(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_session_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_session_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = session_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let user = ctx.core.auth.current_user(&token).ok_or_else(|| {
        tracing::debug!("Rejected request with unknown session token");
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(SessionContext { user, token });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}
