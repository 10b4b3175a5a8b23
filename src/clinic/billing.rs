use serde::Serialize;
use serde_json::{json, Map};

use super::{Actor, Clinic, ClinicError, PATIENTS_COLLECTION, VISITS_COLLECTION};
use crate::backend::{subcollection, StoreError};
use crate::models::{ActionLog, Billing, Patient, Visit};

/// A patient together with the visit that billing applies to.
#[derive(Debug, Clone, Serialize)]
pub struct BillingView {
    pub patient: Patient,
    pub visit: Visit,
}

impl Clinic {
    pub fn billing_view(&self, patient_id: &str) -> Result<BillingView, ClinicError> {
        let patient = self.get_patient(patient_id)?;
        let visit = self.latest_visit(patient_id)?.ok_or_else(|| {
            tracing::warn!(patient_id, "No visit data found.");
            ClinicError::NoVisitData(patient_id.to_string())
        })?;
        Ok(BillingView { patient, visit })
    }

    /// Attach a bill to the patient's latest visit.
    pub fn generate_bill(
        &self,
        actor: &Actor,
        patient_id: &str,
        amount: f64,
    ) -> Result<BillingView, ClinicError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ClinicError::Validation(
                "Amount must be a non-negative number".into(),
            ));
        }

        let BillingView { patient, mut visit } = self.billing_view(patient_id)?;
        let billing = Billing {
            amount,
            generated_at: chrono::Utc::now(),
        };

        let mut fields = Map::new();
        fields.insert(
            "billing".into(),
            serde_json::to_value(&billing).map_err(StoreError::from)?,
        );
        self.store.update(
            &subcollection(PATIENTS_COLLECTION, patient_id, VISITS_COLLECTION),
            &visit.id,
            fields,
        )?;
        visit.billing = Some(billing);

        self.audit(
            actor,
            ActionLog::new(
                "Bill Generated",
                format!("Generated bill of ₹{amount} for {}", patient.name),
            )
            .patient(patient_id)
            .data("visit_id", Some(json!(visit.id)))
            .data("amount", Some(json!(amount))),
        );
        Ok(BillingView { patient, visit })
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
                    name: "Kiran".into(),
                    age: Some(30),
                    gender: None,
                },
            )
            .unwrap()
            .id
    }

    #[test]
    fn view_requires_patient_and_visit() {
        let (_store, clinic) = clinic();
        let err = clinic.billing_view("ghost").unwrap_err();
        assert_eq!(err.to_string(), "Patient not found");

        let pid = patient(&clinic);
        let err = clinic.billing_view(&pid).unwrap_err();
        assert!(matches!(err, ClinicError::NoVisitData(_)));
        assert_eq!(err.to_string(), "No visit data found.");
    }

    #[test]
    fn bill_lands_on_latest_visit() {
        let (store, clinic) = clinic();
        let pid = patient(&clinic);
        clinic.create_visit(&receptionist(), &pid, Some("OLD001")).unwrap();
        let latest = clinic.create_visit(&receptionist(), &pid, Some("NEW002")).unwrap();

        let view = clinic.generate_bill(&receptionist(), &pid, 450.5).unwrap();
        assert_eq!(view.visit.id, latest.id);
        assert_eq!(view.visit.billing.as_ref().unwrap().amount, 450.5);

        let visits = clinic.list_visits(&pid).unwrap();
        assert!(visits[0].billing.is_some());
        assert!(visits[1].billing.is_none());

        let logs = store.list(LOGS_COLLECTION).unwrap();
        let last = logs.last().unwrap();
        assert_eq!(last.data["action"], "Bill Generated");
        assert_eq!(last.data["additional_data"]["amount"], 450.5);
    }

    #[test]
    fn rejects_negative_and_non_finite_amounts() {
        let (_store, clinic) = clinic();
        let pid = patient(&clinic);
        clinic.create_visit(&receptionist(), &pid, None).unwrap();
        for amount in [-1.0, f64::NAN, f64::INFINITY] {
            let err = clinic.generate_bill(&receptionist(), &pid, amount).unwrap_err();
            assert!(matches!(err, ClinicError::Validation(_)));
        }
        assert!(clinic.generate_bill(&receptionist(), &pid, 0.0).is_ok());
    }
}
