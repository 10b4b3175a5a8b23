use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

/// Role document stored at `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub email: String,
    pub role: Role,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}
