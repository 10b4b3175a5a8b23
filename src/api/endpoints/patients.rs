//! Patient registry endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::access::require_role;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::models::{NewPatient, Patient, Role};

#[derive(Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// `GET /api/patients?search=`: any signed-in role.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    require_role(&ctx, &session.user, None).await?;
    let patients = ctx.core.clinic.list_patients(query.search.as_deref())?;
    Ok(Json(patients))
}

/// `GET /api/patients/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<Patient>, ApiError> {
    require_role(&ctx, &session.user, None).await?;
    Ok(Json(ctx.core.clinic.get_patient(&patient_id)?))
}

/// `POST /api/patients`: receptionists register new patients.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Json(input): Json<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let actor = require_role(&ctx, &session.user, Some(Role::Receptionist)).await?;
    let patient = ctx.core.clinic.register_patient(&actor, input)?;
    Ok((StatusCode::CREATED, Json(patient)))
}
