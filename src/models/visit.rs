use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One clinic visit, nested under its patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<Billing>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Visit {
    /// A visit still waiting on the doctor.
    pub fn is_prescription_pending(&self) -> bool {
        self.prescription
            .as_deref()
            .map_or(true, |p| p.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Billing {
    pub amount: f64,
    pub generated_at: DateTime<Utc>,
}
