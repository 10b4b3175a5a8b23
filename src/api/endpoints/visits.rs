//! Visit and prescription endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::access::require_role;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::models::{Role, Visit};

#[derive(Deserialize, Default)]
pub struct NewVisitRequest {
    /// Optional desk-issued token; generated when absent.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct PrescriptionRequest {
    pub prescription: String,
}

/// `GET /api/patients/:id/visits`: newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<Visit>>, ApiError> {
    require_role(&ctx, &session.user, None).await?;
    ctx.core.clinic.get_patient(&patient_id)?;
    Ok(Json(ctx.core.clinic.list_visits(&patient_id)?))
}

/// `POST /api/patients/:id/visits`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(patient_id): Path<String>,
    body: Option<Json<NewVisitRequest>>,
) -> Result<(StatusCode, Json<Visit>), ApiError> {
    let actor = require_role(&ctx, &session.user, Some(Role::Receptionist)).await?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let visit = ctx
        .core
        .clinic
        .create_visit(&actor, &patient_id, req.token.as_deref())?;
    Ok((StatusCode::CREATED, Json(visit)))
}

/// `PUT /api/patients/:id/visits/:visit_id/prescription`: doctors only.
pub async fn update_prescription(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path((patient_id, visit_id)): Path<(String, String)>,
    Json(req): Json<PrescriptionRequest>,
) -> Result<Json<Visit>, ApiError> {
    let actor = require_role(&ctx, &session.user, Some(Role::Doctor)).await?;
    let visit = ctx.core.clinic.update_prescription(
        &actor,
        &patient_id,
        &visit_id,
        &req.prescription,
    )?;
    Ok(Json(visit))
}
