//! Clinic workflows: patient registration, visits, prescriptions, billing
//! and the two dashboards.
//!
//! Every mutating operation leaves an entry in the audit trail.

mod billing;
mod dashboard;
mod patients;
mod visits;

pub use billing::BillingView;
pub use dashboard::{DashboardStats, DoctorDashboard, PatientSummary, ReceptionistDashboard, ReceptionistRow};
pub use visits::{generate_visit_token, VISIT_TOKEN_LENGTH};

use std::sync::Arc;

use crate::audit;
use crate::backend::{AuthUser, DocumentStore, StoreError};
use crate::models::{ActionLog, Role};

pub const PATIENTS_COLLECTION: &str = "patients";
pub const VISITS_COLLECTION: &str = "visits";

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("Patient not found")]
    PatientNotFound(String),
    #[error("No visit data found.")]
    NoVisitData(String),
    #[error("Visit not found")]
    VisitNotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who is performing an operation, for the audit trail.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: Option<AuthUser>,
    pub role: Role,
}

impl Actor {
    pub fn new(user: AuthUser, role: Role) -> Self {
        Self {
            user: Some(user),
            role,
        }
    }
}

/// Clinic operations over a document store.
#[derive(Clone)]
pub struct Clinic {
    store: Arc<dyn DocumentStore>,
}

impl Clinic {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn audit(&self, actor: &Actor, log: ActionLog) {
        audit::log_action(self.store.as_ref(), actor.user.as_ref(), log.role(actor.role));
    }
}
