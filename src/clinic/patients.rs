use serde_json::json;

use super::{Actor, Clinic, ClinicError, PATIENTS_COLLECTION};
use crate::backend::to_fields;
use crate::models::{ActionLog, NewPatient, Patient};

impl Clinic {
    pub fn register_patient(&self, actor: &Actor, input: NewPatient) -> Result<Patient, ClinicError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ClinicError::Validation("Patient name is required".into()));
        }

        let patient = Patient {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            age: input.age,
            gender: input
                .gender
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty()),
            created_at: chrono::Utc::now(),
        };
        self.store
            .create(PATIENTS_COLLECTION, &patient.id, to_fields(&patient)?)?;

        self.audit(
            actor,
            ActionLog::new("Patient Added", format!("Added patient {}", patient.name))
                .patient(patient.id.clone())
                .data("age", patient.age.map(|a| json!(a)))
                .data("gender", patient.gender.as_ref().map(|g| json!(g))),
        );
        Ok(patient)
    }

    /// All patients in registration order, optionally filtered by a
    /// case-insensitive name fragment.
    pub fn list_patients(&self, search: Option<&str>) -> Result<Vec<Patient>, ClinicError> {
        let needle = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();
        let mut patients = Vec::new();
        for doc in self.store.list(PATIENTS_COLLECTION)? {
            let patient: Patient = doc.decode()?;
            if needle.is_empty() || patient.name.to_lowercase().contains(&needle) {
                patients.push(patient);
            }
        }
        Ok(patients)
    }

    pub fn get_patient(&self, patient_id: &str) -> Result<Patient, ClinicError> {
        self.store
            .get(PATIENTS_COLLECTION, patient_id)?
            .ok_or_else(|| ClinicError::PatientNotFound(patient_id.to_string()))?
            .decode()
            .map_err(ClinicError::from)
    }
}
