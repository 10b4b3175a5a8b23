//! Authentication gate and role router.
//!
//! Decides, for one caller, whether a gated view may be shown or where to
//! send them instead. The role comes from the `users/{uid}` document,
//! fetched through the retrying reader.

use serde::Serialize;
use tokio::sync::watch;

use crate::backend::failsafe::DOCUMENT_NOT_FOUND;
use crate::backend::{get_document_failsafe, AuthUser, ConnectionController, RetryPolicy};
use crate::models::{Role, UserAccount};

pub const LOGIN_PATH: &str = "/login";
pub const USERS_COLLECTION: &str = "users";
/// Attempts used for the role lookup.
pub const ROLE_FETCH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "target", rename_all = "snake_case")]
pub enum GateState {
    Loading,
    CheckingRole,
    Redirecting(String),
    Authorized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Authorized { user: AuthUser, role: Role },
    Redirect(String),
}

impl GateDecision {
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Self::Redirect(target) => Some(target),
            Self::Authorized { .. } => None,
        }
    }
}

pub struct AuthGate<'a> {
    connection: &'a ConnectionController,
    policy: &'a RetryPolicy,
    expected_role: Option<Role>,
    resolved_role: Option<Role>,
    last_error: Option<String>,
    state: GateState,
    transitions: Vec<GateState>,
}

impl<'a> AuthGate<'a> {
    /// Gate for a view. With no `expected_role` the gate only routes the
    /// caller to their own dashboard.
    pub fn new(
        connection: &'a ConnectionController,
        policy: &'a RetryPolicy,
        expected_role: Option<Role>,
    ) -> Self {
        Self {
            connection,
            policy,
            expected_role,
            resolved_role: None,
            last_error: None,
            state: GateState::Loading,
            transitions: vec![GateState::Loading],
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Role read from the caller's user document by the last evaluation.
    pub fn resolved_role(&self) -> Option<Role> {
        self.resolved_role
    }

    /// Why the last role lookup came back empty. `None` after a successful
    /// lookup or when the caller was signed out.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Every state entered so far, oldest first.
    pub fn transitions(&self) -> &[GateState] {
        &self.transitions
    }

    fn enter(&mut self, state: GateState) {
        tracing::debug!(?state, "Auth gate transition");
        self.transitions.push(state.clone());
        self.state = state;
    }

    fn redirect(&mut self, target: String) -> GateDecision {
        self.enter(GateState::Redirecting(target.clone()));
        GateDecision::Redirect(target)
    }

    /// Resolve the gate for `user` (`None` when signed out).
    pub async fn evaluate(&mut self, user: Option<&AuthUser>) -> GateDecision {
        if self.state != GateState::Loading {
            self.enter(GateState::Loading);
        }
        self.resolved_role = None;
        self.last_error = None;

        let Some(user) = user else {
            return self.redirect(LOGIN_PATH.to_string());
        };

        self.enter(GateState::CheckingRole);
        let result = get_document_failsafe::<UserAccount>(
            self.connection,
            self.policy,
            USERS_COLLECTION,
            &user.uid,
            ROLE_FETCH_ATTEMPTS,
        )
        .await;

        let account = match (result.data, result.error) {
            (Some(account), _) => account,
            (None, error) => {
                let error = error.unwrap_or_else(|| DOCUMENT_NOT_FOUND.to_string());
                tracing::warn!(uid = %user.uid, error = %error, "Role lookup failed");
                self.last_error = Some(error);
                return self.redirect(LOGIN_PATH.to_string());
            }
        };
        self.resolved_role = Some(account.role);

        match self.expected_role {
            None => self.redirect(account.role.home_path()),
            Some(expected) if expected != account.role => {
                tracing::warn!(
                    uid = %user.uid,
                    expected = %expected,
                    actual = %account.role,
                    "Role mismatch"
                );
                self.redirect(LOGIN_PATH.to_string())
            }
            Some(_) => {
                self.enter(GateState::Authorized);
                GateDecision::Authorized {
                    user: user.clone(),
                    role: account.role,
                }
            }
        }
    }

    /// Re-evaluate on every auth state change until the sender side closes.
    /// Dropping the returned future unsubscribes.
    pub async fn watch<F>(&mut self, mut changes: watch::Receiver<Option<AuthUser>>, mut on_decision: F)
    where
        F: FnMut(&GateDecision),
    {
        loop {
            let user = changes.borrow_and_update().clone();
            let decision = self.evaluate(user.as_ref()).await;
            on_decision(&decision);
            if changes.changed().await.is_err() {
                break;
            }
        }
    }
}
