//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store_online: bool,
    pub uptime_secs: u64,
}

/// `GET /api/health`: liveness plus store connectivity.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        store_online: ctx.core.store().is_online(),
        uptime_secs: ctx.core.uptime().as_secs(),
    })
}
