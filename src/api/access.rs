//! Role checks for handlers, built on the auth gate.

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::auth_gate::{AuthGate, GateDecision};
use crate::backend::failsafe::is_connection_message;
use crate::backend::AuthUser;
use crate::clinic::Actor;
use crate::models::Role;

/// What one gate evaluation found out about the caller.
struct GateOutcome {
    decision: GateDecision,
    role: Option<Role>,
    lookup_error: Option<String>,
}

async fn run_gate(ctx: &ApiContext, user: Option<&AuthUser>, expected: Option<Role>) -> GateOutcome {
    let core = &ctx.core;
    let mut gate = AuthGate::new(&core.connection, &core.retry_policy, expected);
    let decision = gate.evaluate(user).await;
    GateOutcome {
        decision,
        role: gate.resolved_role(),
        lookup_error: gate.last_error().map(str::to_string),
    }
}

/// Resolve the caller's role for a JSON endpoint. `None` accepts any role.
pub async fn require_role(
    ctx: &ApiContext,
    user: &AuthUser,
    expected: Option<Role>,
) -> Result<Actor, ApiError> {
    let outcome = run_gate(ctx, Some(user), expected).await;
    match (outcome.decision, outcome.role) {
        (GateDecision::Authorized { user, role }, _) => Ok(Actor::new(user, role)),
        (_, Some(actual)) => match expected {
            None => Ok(Actor::new(user.clone(), actual)),
            Some(expected) => Err(ApiError::Forbidden(format!(
                "This action requires the {expected} role"
            ))),
        },
        (_, None) => Err(lookup_failure(outcome.lookup_error)),
    }
}

/// An unreachable store is retryable; any other failed lookup means the
/// caller has no usable role.
fn lookup_failure(error: Option<String>) -> ApiError {
    match error {
        Some(error) if is_connection_message(&error) => {
            ApiError::ConnectionIssue(format!("Connection issue: {error}"))
        }
        _ => ApiError::Forbidden("User role not found in database.".into()),
    }
}

/// Gate a web view. `Err` carries the `303 See Other` redirect to send.
pub async fn gate_page(
    ctx: &ApiContext,
    headers: &HeaderMap,
    expected: Option<Role>,
) -> Result<Actor, Response> {
    let user = ctx.current_user(headers);
    match run_gate(ctx, user.as_ref(), expected).await.decision {
        GateDecision::Authorized { user, role } => Ok(Actor::new(user, role)),
        GateDecision::Redirect(target) => Err(Redirect::to(&target).into_response()),
    }
}
