//! Registration, sign-in and sign-out.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::access::require_role;
use crate::api::error::ApiError;
use crate::api::types::{session_cookie, ApiContext, SessionContext};
use crate::audit::spawn_log_action;
use crate::auth_gate::{LOGIN_PATH, USERS_COLLECTION};
use crate::backend::failsafe::{is_connection_message, DEFAULT_MAX_RETRIES, DOCUMENT_NOT_FOUND};
use crate::backend::{get_document_failsafe, set_document_failsafe, AuthError, AuthSession, AuthUser};
use crate::core_state::CoreState;
use crate::models::{ActionLog, Role, UserAccount};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Doctor
}

/// Run a password-hashing auth call on the blocking pool.
async fn run_auth<F>(core: &Arc<CoreState>, call: F) -> Result<AuthSession, ApiError>
where
    F: FnOnce(&CoreState) -> Result<AuthSession, AuthError> + Send + 'static,
{
    let core = Arc::clone(core);
    let session = tokio::task::spawn_blocking(move || call(&core))
        .await
        .map_err(|e| ApiError::Internal(format!("Auth task failed: {e}")))??;
    Ok(session)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user: AuthUser,
    pub role: Role,
    pub token: String,
    /// Where the client should navigate next.
    pub redirect: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub uid: String,
    pub email: String,
    pub role: Role,
}

/// `POST /api/auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let core = &ctx.core;
    let (email, password) = (req.email, req.password);
    let session = run_auth(core, move |core| core.auth.create_user(&email, &password)).await?;

    let account = UserAccount {
        email: session.user.email.clone(),
        role: req.role,
        created_at: chrono::Utc::now(),
    };
    let written = set_document_failsafe(
        &core.connection,
        &core.retry_policy,
        USERS_COLLECTION,
        &session.user.uid,
        &account,
        DEFAULT_MAX_RETRIES,
        false,
    )
    .await;
    if !written.success {
        let error = written.error.unwrap_or_default();
        return Err(ApiError::Storage(format!("Failed to save user data: {error}")));
    }

    spawn_log_action(
        core.store().clone(),
        Some(session.user.clone()),
        ActionLog::new("User Registered", format!("Registered as {}", req.role)).role(req.role),
    );

    let headers = session_cookie(Some(&session.token));
    let body = SessionResponse {
        redirect: req.role.home_path(),
        role: req.role,
        user: session.user,
        token: session.token,
    };
    Ok((StatusCode::CREATED, headers, Json(body)).into_response())
}

/// `POST /api/auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let core = &ctx.core;
    let LoginRequest { email, password } = req;
    let session = run_auth(core, move |core| core.auth.sign_in(&email, &password)).await?;

    let result = get_document_failsafe::<UserAccount>(
        &core.connection,
        &core.retry_policy,
        USERS_COLLECTION,
        &session.user.uid,
        DEFAULT_MAX_RETRIES,
    )
    .await;

    let account = match (result.data, result.error) {
        (Some(account), _) => account,
        (None, Some(error)) if is_connection_message(&error) => {
            tracing::warn!(attempts = result.metadata.attempts, "Login blocked by connection issue");
            return Err(ApiError::ConnectionIssue(format!("Connection issue: {error}")));
        }
        (None, Some(error)) if error != DOCUMENT_NOT_FOUND => {
            return Err(ApiError::Storage(format!("Failed to get user data: {error}")));
        }
        (None, _) => {
            return Err(ApiError::NotFound("User role not found in database.".into()));
        }
    };

    let headers = session_cookie(Some(&session.token));
    let body = SessionResponse {
        redirect: account.role.home_path(),
        role: account.role,
        user: session.user,
        token: session.token,
    };
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    ctx.core.auth.sign_out(&session.token);
    tracing::info!(uid = %session.user.uid, "Signed out");
    (
        StatusCode::OK,
        session_cookie(None),
        Json(serde_json::json!({ "redirect": LOGIN_PATH })),
    )
        .into_response()
}

/// `GET /api/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<MeResponse>, ApiError> {
    let actor = require_role(&ctx, &session.user, None).await?;
    Ok(Json(MeResponse {
        uid: session.user.uid,
        email: session.user.email,
        role: actor.role,
    }))
}
