//! Audit trail of clinic actions, written to the `logs` collection.
//!
//! Writes never fail the caller: errors are reported through `tracing`
//! and dropped.

use std::sync::Arc;

use serde_json::Map;
use tokio::task::JoinHandle;

use crate::backend::{to_fields, AuthUser, DocumentStore, StoreError};
use crate::models::{ActionLog, LogEntry};

pub const LOGS_COLLECTION: &str = "logs";

/// Build the stored record for `log`, attributed to `actor` when known.
pub fn build_entry(actor: Option<&AuthUser>, log: ActionLog) -> LogEntry {
    let additional_data: Map<_, _> = log
        .additional_data
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect();

    LogEntry {
        uid: actor.map(|u| u.uid.clone()),
        email: actor.map(|u| u.email.clone()),
        action: log.action,
        message: log.message,
        patient_id: log.patient_id.filter(|id| !id.is_empty()),
        user_role: log.user_role,
        severity: log.severity,
        additional_data: (!additional_data.is_empty()).then_some(additional_data),
        timestamp: chrono::Utc::now(),
    }
}

fn write_entry(store: &dyn DocumentStore, entry: &LogEntry) -> Result<String, StoreError> {
    store.add(LOGS_COLLECTION, to_fields(entry)?)
}

/// Record an action. Returns nothing; a failed write is only logged.
pub fn log_action(store: &dyn DocumentStore, actor: Option<&AuthUser>, log: ActionLog) {
    let entry = build_entry(actor, log);
    match write_entry(store, &entry) {
        Ok(_) => tracing::info!("[LOG] {}: {}", entry.action, entry.message),
        Err(e) => tracing::error!("Failed to log action: {e}"),
    }
}

/// Fire-and-forget variant of [`log_action`]. The handle may be dropped.
pub fn spawn_log_action(
    store: Arc<dyn DocumentStore>,
    actor: Option<AuthUser>,
    log: ActionLog,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || log_action(store.as_ref(), actor.as_ref(), log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::backend::{MemoryStore, StoreErrorCode};
    use crate::models::{Role, Severity};

    fn actor() -> AuthUser {
        AuthUser {
            uid: "test-uid".into(),
            email: "test@example.com".into(),
        }
    }

    #[test]
    fn writes_attributed_entry() {
        let store = MemoryStore::new();
        log_action(
            &store,
            Some(&actor()),
            ActionLog::new("Test Action", "Test message")
                .patient("patient-123")
                .role(Role::Doctor),
        );

        let docs = store.list(LOGS_COLLECTION).unwrap();
        assert_eq!(docs.len(), 1);
        let data = &docs[0].data;
        assert_eq!(data["uid"], "test-uid");
        assert_eq!(data["email"], "test@example.com");
        assert_eq!(data["action"], "Test Action");
        assert_eq!(data["patient_id"], "patient-123");
        assert_eq!(data["user_role"], "doctor");
        assert_eq!(data["severity"], "info");
        assert!(data.get("additional_data").is_none());
        assert!(data.contains_key("timestamp"));
    }

    #[test]
    fn defaults_without_actor_or_patient() {
        let entry = build_entry(None, ActionLog::new("A", "m"));
        assert!(entry.uid.is_none());
        assert!(entry.email.is_none());
        assert!(entry.patient_id.is_none());
        assert_eq!(entry.user_role, Role::Receptionist);
        assert_eq!(entry.severity, Severity::Info);
    }

    #[test]
    fn strips_missing_values_but_keeps_nulls_and_empty_strings() {
        let entry = build_entry(
            None,
            ActionLog::new("A", "m")
                .severity(Severity::Warning)
                .data("missing", None)
                .data("nothing", Some(Value::Null))
                .data("blank", Some(json!("")))
                .data("count", Some(json!(3))),
        );
        let data = entry.additional_data.unwrap();
        assert!(!data.contains_key("missing"));
        assert_eq!(data["nothing"], Value::Null);
        assert_eq!(data["blank"], "");
        assert_eq!(data["count"], 3);
    }

    #[test]
    fn omits_additional_data_when_everything_is_stripped() {
        let store = MemoryStore::new();
        log_action(&store, None, ActionLog::new("A", "m").data("gone", None));
        let docs = store.list(LOGS_COLLECTION).unwrap();
        assert!(docs[0].data.get("additional_data").is_none());
    }

    #[test]
    fn write_failures_are_swallowed() {
        let store = MemoryStore::new();
        store.inject_failures(StoreError::new(StoreErrorCode::Internal, "boom"), 1);
        log_action(&store, Some(&actor()), ActionLog::new("A", "m"));
        assert!(store.list(LOGS_COLLECTION).unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawned_write_completes_in_background() {
        let store = Arc::new(MemoryStore::new());
        spawn_log_action(store.clone(), None, ActionLog::new("Bill Generated", "₹500"))
            .await
            .unwrap();
        assert_eq!(store.list(LOGS_COLLECTION).unwrap().len(), 1);
    }
}
