//! Connection status and manual retry, backing the offline banner.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::backend::connection::MAX_RESET_ATTEMPTS;

#[derive(Debug, Serialize)]
pub struct NetworkStatus {
    pub online: bool,
    pub store_online: bool,
    pub reset_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

fn snapshot(ctx: &ApiContext) -> NetworkStatus {
    let connection = &ctx.core.connection;
    let online = connection.status();
    let store_online = connection.store().is_online();
    NetworkStatus {
        online,
        store_online,
        reset_attempts: connection.reset_attempts(),
        message: (!(online && store_online))
            .then_some("Database connection issue. Some features may not work properly."),
    }
}

/// `GET /api/network`
pub async fn status(State(ctx): State<ApiContext>) -> Json<NetworkStatus> {
    Json(snapshot(&ctx))
}

/// `POST /api/network/retry`: reset the store connection once more. When
/// the reset budget is spent, fall back to a plain enable, which clears it.
pub async fn retry(State(ctx): State<ApiContext>) -> Json<NetworkStatus> {
    let connection = &ctx.core.connection;
    if !connection.reset_connection().await
        && connection.reset_attempts() >= MAX_RESET_ATTEMPTS
    {
        tracing::info!("Reset budget spent, re-enabling network directly");
        connection.enable_connection().await;
    }
    Json(snapshot(&ctx))
}
