//! Billing endpoint.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::access::require_role;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::clinic::BillingView;
use crate::models::Role;

#[derive(Deserialize)]
pub struct BillRequest {
    pub amount: f64,
}

/// `POST /api/billing/:id`: bill the patient's latest visit.
pub async fn generate(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(patient_id): Path<String>,
    Json(req): Json<BillRequest>,
) -> Result<Json<BillingView>, ApiError> {
    let actor = require_role(&ctx, &session.user, Some(Role::Receptionist)).await?;
    let view = ctx.core.clinic.generate_bill(&actor, &patient_id, req.amount)?;
    Ok(Json(view))
}
