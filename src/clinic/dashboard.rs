use serde::Serialize;

use super::{Clinic, ClinicError};
use crate::models::{Patient, Visit};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_patients: usize,
    /// Patients with at least one visit.
    pub active_patients: usize,
    pub total_visits: usize,
    pub pending_prescriptions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub patient: Patient,
    pub latest_visit: Visit,
    /// Newest first; `visits[0]` is `latest_visit`.
    pub visits: Vec<Visit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorDashboard {
    pub stats: DashboardStats,
    pub patients: Vec<PatientSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceptionistRow {
    pub patient: Patient,
    pub latest_token: Option<String>,
    pub visit_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceptionistDashboard {
    pub total_patients: usize,
    pub patients: Vec<ReceptionistRow>,
}

impl Clinic {
    fn patients_with_visits(&self) -> Result<Vec<(Patient, Vec<Visit>)>, ClinicError> {
        self.list_patients(None)?
            .into_iter()
            .map(|patient| {
                let visits = self.list_visits(&patient.id)?;
                Ok((patient, visits))
            })
            .collect()
    }

    /// Patients that have visits, with stats computed over the whole clinic
    /// and the list narrowed by `search`.
    pub fn doctor_dashboard(&self, search: Option<&str>) -> Result<DoctorDashboard, ClinicError> {
        let all = self.patients_with_visits()?;
        let needle = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();

        let stats = DashboardStats {
            total_patients: all.len(),
            active_patients: all.iter().filter(|(_, v)| !v.is_empty()).count(),
            total_visits: all.iter().map(|(_, v)| v.len()).sum(),
            pending_prescriptions: all
                .iter()
                .flat_map(|(_, v)| v.iter())
                .filter(|v| v.is_prescription_pending())
                .count(),
        };

        let patients = all
            .into_iter()
            .filter(|(p, _)| needle.is_empty() || p.name.to_lowercase().contains(&needle))
            .filter_map(|(patient, visits)| {
                let latest_visit = visits.first()?.clone();
                Some(PatientSummary {
                    patient,
                    latest_visit,
                    visits,
                })
            })
            .collect();

        Ok(DoctorDashboard { stats, patients })
    }

    pub fn receptionist_dashboard(&self) -> Result<ReceptionistDashboard, ClinicError> {
        let patients: Vec<ReceptionistRow> = self
            .patients_with_visits()?
            .into_iter()
            .map(|(patient, visits)| ReceptionistRow {
                latest_token: visits.first().map(|v| v.token.clone()),
                visit_count: visits.len(),
                patient,
            })
            .collect();

        Ok(ReceptionistDashboard {
            total_patients: patients.len(),
            patients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::NewPatient;

    fn add(clinic: &Clinic, name: &str) -> String {
        clinic
            .register_patient(
                &receptionist(),
                NewPatient {
                    name: name.into(),
                    age: None,
                    gender: None,
                },
            )
            .unwrap()
            .id
    }

    #[test]
    fn doctor_sees_only_patients_with_visits() {
        let (_store, clinic) = clinic();
        let meera = add(&clinic, "Meera");
        let ravi = add(&clinic, "Ravi");
        add(&clinic, "Walk-in");

        let v1 = clinic.create_visit(&receptionist(), &meera, None).unwrap();
        clinic.create_visit(&receptionist(), &meera, None).unwrap();
        clinic.create_visit(&receptionist(), &ravi, None).unwrap();
        clinic
            .update_prescription(&doctor(), &meera, &v1.id, "ORS")
            .unwrap();

        let dash = clinic.doctor_dashboard(None).unwrap();
        assert_eq!(
            dash.stats,
            DashboardStats {
                total_patients: 3,
                active_patients: 2,
                total_visits: 3,
                pending_prescriptions: 2,
            }
        );
        assert_eq!(dash.patients.len(), 2);
        let meera_summary = &dash.patients[0];
        assert_eq!(meera_summary.visits.len(), 2);
        assert_eq!(meera_summary.latest_visit.id, meera_summary.visits[0].id);
    }

    #[test]
    fn doctor_search_filters_list_not_stats() {
        let (_store, clinic) = clinic();
        let meera = add(&clinic, "Meera");
        let ravi = add(&clinic, "Ravi");
        clinic.create_visit(&receptionist(), &meera, None).unwrap();
        clinic.create_visit(&receptionist(), &ravi, None).unwrap();

        let dash = clinic.doctor_dashboard(Some("rav")).unwrap();
        assert_eq!(dash.patients.len(), 1);
        assert_eq!(dash.patients[0].patient.name, "Ravi");
        assert_eq!(dash.stats.total_patients, 2);

        assert!(clinic.doctor_dashboard(Some("zzz")).unwrap().patients.is_empty());
    }

    #[test]
    fn receptionist_sees_latest_tokens() {
        let (_store, clinic) = clinic();
        let meera = add(&clinic, "Meera");
        add(&clinic, "Ravi");
        clinic.create_visit(&receptionist(), &meera, Some("AAA111")).unwrap();
        clinic.create_visit(&receptionist(), &meera, Some("BBB222")).unwrap();

        let dash = clinic.receptionist_dashboard().unwrap();
        assert_eq!(dash.total_patients, 2);
        assert_eq!(dash.patients[0].latest_token.as_deref(), Some("BBB222"));
        assert_eq!(dash.patients[0].visit_count, 2);
        assert!(dash.patients[1].latest_token.is_none());
    }
}
