use rand::Rng;
use serde_json::{json, Map, Value};

use super::{Actor, Clinic, ClinicError, PATIENTS_COLLECTION, VISITS_COLLECTION};
use crate::backend::{subcollection, to_fields, StoreErrorCode};
use crate::models::{ActionLog, Visit};

pub const VISIT_TOKEN_LENGTH: usize = 6;
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random uppercase alphanumeric visit token.
pub fn generate_visit_token() -> String {
    let mut rng = rand::thread_rng();
    (0..VISIT_TOKEN_LENGTH)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

fn visits_path(patient_id: &str) -> String {
    subcollection(PATIENTS_COLLECTION, patient_id, VISITS_COLLECTION)
}

impl Clinic {
    /// Open a visit for an existing patient. A blank `token` gets a
    /// generated one.
    pub fn create_visit(
        &self,
        actor: &Actor,
        patient_id: &str,
        token: Option<&str>,
    ) -> Result<Visit, ClinicError> {
        let patient = self.get_patient(patient_id)?;

        let token = token
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(generate_visit_token);
        let visit = Visit {
            id: uuid::Uuid::new_v4().to_string(),
            token,
            prescription: None,
            billing: None,
            created_at: chrono::Utc::now(),
        };
        self.store
            .create(&visits_path(patient_id), &visit.id, to_fields(&visit)?)?;

        self.audit(
            actor,
            ActionLog::new(
                "Visit Added",
                format!("Added visit {} for {}", visit.token, patient.name),
            )
            .patient(patient_id)
            .data("visit_id", Some(json!(visit.id)))
            .data("token", Some(json!(visit.token))),
        );
        Ok(visit)
    }

    /// Visits of a patient, newest first.
    pub fn list_visits(&self, patient_id: &str) -> Result<Vec<Visit>, ClinicError> {
        let mut visits = self
            .store
            .list(&visits_path(patient_id))?
            .iter()
            .map(|doc| doc.decode::<Visit>())
            .collect::<Result<Vec<_>, _>>()?;
        // Later insertions win ties
        visits.reverse();
        visits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visits)
    }

    pub fn latest_visit(&self, patient_id: &str) -> Result<Option<Visit>, ClinicError> {
        Ok(self.list_visits(patient_id)?.into_iter().next())
    }

    pub fn update_prescription(
        &self,
        actor: &Actor,
        patient_id: &str,
        visit_id: &str,
        prescription: &str,
    ) -> Result<Visit, ClinicError> {
        let mut fields = Map::new();
        fields.insert("prescription".into(), Value::String(prescription.to_string()));

        let path = visits_path(patient_id);
        self.store.update(&path, visit_id, fields).map_err(|e| {
            if e.is_code(StoreErrorCode::NotFound) {
                ClinicError::VisitNotFound(visit_id.to_string())
            } else {
                ClinicError::Store(e)
            }
        })?;

        let visit: Visit = self
            .store
            .get(&path, visit_id)?
            .ok_or_else(|| ClinicError::VisitNotFound(visit_id.to_string()))?
            .decode()?;

        self.audit(
            actor,
            ActionLog::new("Prescription Updated", format!("Updated prescription for visit {}", visit.token))
                .patient(patient_id)
                .data("visit_id", Some(json!(visit_id))),
        );
        Ok(visit)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::audit::LOGS_COLLECTION;
    use crate::backend::DocumentStore;
    use crate::models::NewPatient;

    fn patient(clinic: &Clinic) -> String {
        clinic
            .register_patient(
                &receptionist(),
                NewPatient {
                    name: "Asha".into(),
                    age: None,
                    gender: None,
                },
            )
            .unwrap()
            .id
    }

    #[test]
    fn generated_tokens_are_uppercase_alphanumeric() {
        for _ in 0..100 {
            let token = generate_visit_token();
            assert_eq!(token.len(), VISIT_TOKEN_LENGTH);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn visits_are_listed_newest_first() {
        let (_store, clinic) = clinic();
        let pid = patient(&clinic);
        let first = clinic.create_visit(&receptionist(), &pid, None).unwrap();
        let second = clinic.create_visit(&receptionist(), &pid, Some(" t-42 ")).unwrap();
        assert_eq!(second.token, "T-42");

        let ids: Vec<String> = clinic
            .list_visits(&pid)
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec![second.id.clone(), first.id]);
        assert_eq!(clinic.latest_visit(&pid).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn visit_requires_existing_patient() {
        let (_store, clinic) = clinic();
        let err = clinic.create_visit(&receptionist(), "ghost", None).unwrap_err();
        assert!(matches!(err, ClinicError::PatientNotFound(_)));
    }

    #[test]
    fn prescription_update_is_audited_as_doctor() {
        let (store, clinic) = clinic();
        let pid = patient(&clinic);
        let visit = clinic.create_visit(&receptionist(), &pid, None).unwrap();

        let updated = clinic
            .update_prescription(&doctor(), &pid, &visit.id, "Amoxicillin 500mg")
            .unwrap();
        assert_eq!(updated.prescription.as_deref(), Some("Amoxicillin 500mg"));
        assert_eq!(updated.token, visit.token);

        let logs = store.list(LOGS_COLLECTION).unwrap();
        let last = logs.last().unwrap();
        assert_eq!(last.data["action"], "Prescription Updated");
        assert_eq!(last.data["user_role"], "doctor");
        assert_eq!(last.data["email"], "doc@clinic.org");
    }

    #[test]
    fn prescription_for_unknown_visit() {
        let (_store, clinic) = clinic();
        let pid = patient(&clinic);
        let err = clinic
            .update_prescription(&doctor(), &pid, "missing", "rest")
            .unwrap_err();
        assert!(matches!(err, ClinicError::VisitNotFound(_)));
    }
}
