//! Gated web views.
//!
//! Each view resolves the caller through the auth gate first; a redirect
//! decision is sent as `303 See Other`. Authorized views answer with a JSON
//! descriptor of what the page shows.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Serialize;

use crate::api::access::gate_page;
use crate::api::endpoints::patients::SearchQuery;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::clinic::Actor;
use crate::models::Role;

/// Navigation links shown on the open pages.
pub const NAV_LINKS: [&str; 4] = ["/login", "/doctor", "/receptionist", "/test"];

#[derive(Serialize)]
pub struct View<T: Serialize> {
    pub view: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> View<T> {
    fn for_actor(view: &'static str, actor: &Actor, data: T) -> Self {
        Self {
            view,
            email: actor.user.as_ref().map(|u| u.email.clone()),
            role: Some(actor.role),
            data,
        }
    }

    fn open(view: &'static str, data: T) -> Self {
        Self {
            view,
            email: None,
            role: None,
            data,
        }
    }
}

#[derive(Serialize)]
pub struct LoginView {
    pub roles: [Role; 2],
    pub login: &'static str,
    pub register: &'static str,
}

#[derive(Serialize)]
pub struct TestView {
    pub message: &'static str,
    pub links: [&'static str; 3],
}

/// `GET /`: send the caller to their role's dashboard.
pub async fn index(State(ctx): State<ApiContext>, headers: HeaderMap) -> Response {
    match gate_page(&ctx, &headers, None).await {
        Ok(actor) => Redirect::to(&actor.role.home_path()).into_response(),
        Err(redirect) => redirect,
    }
}

/// `GET /login`
pub async fn login() -> Json<View<LoginView>> {
    Json(View::open(
        "login",
        LoginView {
            roles: [Role::Doctor, Role::Receptionist],
            login: "/api/auth/login",
            register: "/api/auth/register",
        },
    ))
}

/// `GET /doctor?search=`
pub async fn doctor(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Response, ApiError> {
    let actor = match gate_page(&ctx, &headers, Some(Role::Doctor)).await {
        Ok(actor) => actor,
        Err(redirect) => return Ok(redirect),
    };
    let dashboard = ctx.core.clinic.doctor_dashboard(query.search.as_deref())?;
    Ok(Json(View::for_actor("doctor", &actor, dashboard)).into_response())
}

/// `GET /receptionist`
pub async fn receptionist(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let actor = match gate_page(&ctx, &headers, Some(Role::Receptionist)).await {
        Ok(actor) => actor,
        Err(redirect) => return Ok(redirect),
    };
    let dashboard = ctx.core.clinic.receptionist_dashboard()?;
    Ok(Json(View::for_actor("receptionist", &actor, dashboard)).into_response())
}

/// `GET /billing/:id`
pub async fn billing(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Path(patient_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = match gate_page(&ctx, &headers, Some(Role::Receptionist)).await {
        Ok(actor) => actor,
        Err(redirect) => return Ok(redirect),
    };
    let view = ctx.core.clinic.billing_view(&patient_id)?;
    Ok(Json(View::for_actor("billing", &actor, view)).into_response())
}

/// `GET /test`: static page confirming the server answers.
pub async fn test_page() -> Json<View<TestView>> {
    Json(View::open(
        "test",
        TestView {
            message: "This page is working correctly!",
            links: ["/login", "/doctor", "/receptionist"],
        },
    ))
}
