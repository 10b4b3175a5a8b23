use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Role, Severity};

/// Audit record written to `logs/{auto-id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub uid: Option<String>,
    pub email: Option<String>,
    pub action: String,
    pub message: String,
    pub patient_id: Option<String>,
    pub user_role: Role,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Map<String, Value>>,
    pub timestamp: DateTime<Utc>,
}

/// Caller-side description of an audited action. `None` values in
/// `additional_data` mean "not provided" and never reach the store;
/// `Some(Value::Null)` is written as an explicit null.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    pub action: String,
    pub message: String,
    pub patient_id: Option<String>,
    pub user_role: Role,
    pub severity: Severity,
    pub additional_data: BTreeMap<String, Option<Value>>,
}

impl ActionLog {
    pub fn new(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.user_role = role;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: Option<Value>) -> Self {
        self.additional_data.insert(key.into(), value);
        self
    }
}
