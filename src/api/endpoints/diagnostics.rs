//! `GET /debug`: what the server knows about the caller and itself.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::endpoints::pages::NAV_LINKS;
use crate::api::types::ApiContext;
use crate::auth_gate::USERS_COLLECTION;
use crate::config::ConfigPresence;

#[derive(Serialize)]
pub struct ConnectionReport {
    pub online: bool,
    pub store_online: bool,
    pub reset_attempts: u32,
}

#[derive(Serialize)]
pub struct DebugReport {
    pub auth_state: &'static str,
    /// Auth identity merged with the stored user document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    pub config: ConfigPresence,
    pub connection: ConnectionReport,
    pub links: [&'static str; 4],
}

pub async fn debug(State(ctx): State<ApiContext>, headers: HeaderMap) -> Json<DebugReport> {
    let core = &ctx.core;
    let mut report = DebugReport {
        auth_state: "No user authenticated",
        user: None,
        store_error: None,
        config: core.config.backend.presence(),
        connection: ConnectionReport {
            online: core.connection.status(),
            store_online: core.store().is_online(),
            reset_attempts: core.connection.reset_attempts(),
        },
        links: NAV_LINKS,
    };

    let Some(user) = ctx.current_user(&headers) else {
        return Json(report);
    };
    report.auth_state = "User is authenticated";

    let mut fields = Map::new();
    fields.insert("uid".into(), Value::String(user.uid.clone()));
    fields.insert("email".into(), Value::String(user.email.clone()));
    match core.store().get(USERS_COLLECTION, &user.uid) {
        Ok(Some(doc)) => {
            for (key, value) in doc.data {
                fields.entry(key).or_insert(value);
            }
        }
        Ok(None) => {
            fields.insert(
                "user_document".into(),
                Value::String("User not found in database".into()),
            );
        }
        Err(e) => {
            tracing::warn!(uid = %user.uid, "Diagnostics user lookup failed: {e}");
            report.store_error = Some(format!("Store error: {e}"));
        }
    }
    report.user = Some(fields);
    Json(report)
}
