//! Seeded in-memory patient store.
//!
//! `user-1` owns patient `pat-1`, whose profile carries every kind of
//! identifying field so redaction can be checked against the raw values.
//! `user-2` owns `pat-2`, who has no lab results at all. Record timestamps
//! are relative to the moment the store is built.

use std::sync::Arc;

use carebot_db::{
    Consultation, ConsultationRef, InMemoryRecordStore, LabResult, MedicalFile, PatientProfile, Prescription,
    RecordSet, VitalSign,
};
use chrono::{Duration, Utc};

/// Identifying values of the seeded `user-1` patient.
pub struct SeedPatient {
    pub user_id: &'static str,
    pub patient_id: &'static str,
    pub full_name: &'static str,
    pub email: &'static str,
    pub phone: &'static str,
    pub identification_number: &'static str,
    pub address: &'static str,
}

impl SeedPatient {
    /// Every identifying value, for "never leaks" assertions.
    pub fn identifying_values(&self) -> [&'static str; 5] {
        [self.full_name, self.email, self.phone, self.identification_number, self.address]
    }
}

pub const SEED_PATIENT: SeedPatient = SeedPatient {
    user_id: "user-1",
    patient_id: "pat-1",
    full_name: "Nguyễn Văn An",
    email: "an.nguyen@example.com",
    phone: "0912345678",
    identification_number: "012345678901",
    address: "12 Lê Lợi, Quận 1",
};

pub fn seeded_store() -> Arc<InMemoryRecordStore> {
    let now = Utc::now();
    let p = &SEED_PATIENT;

    let patients = vec![
        PatientProfile {
            id: p.patient_id.into(),
            user_id: p.user_id.into(),
            full_name: p.full_name.into(),
            email: Some(p.email.into()),
            phone: Some(p.phone.into()),
            address: Some(p.address.into()),
            date_of_birth: Some("1980-04-12".into()),
            identification_number: Some(p.identification_number.into()),
            medical_history: Some("Tăng huyết áp".into()),
            conditions: vec!["Rối loạn mỡ máu".into()],
        },
        PatientProfile {
            id: "pat-2".into(),
            user_id: "user-2".into(),
            full_name: "Trần Thị Bình".into(),
            email: Some("binh.tran@example.com".into()),
            phone: Some("0987654321".into()),
            address: None,
            date_of_birth: None,
            identification_number: None,
            medical_history: None,
            conditions: vec![],
        },
    ];

    let lab = |id: &str, days_ago: i64, test: &str, value: f64, unit: &str, range: &str| LabResult {
        id: id.into(),
        patient_id: p.patient_id.into(),
        kind: "blood".into(),
        test_name: Some(test.into()),
        value: Some(value),
        unit: Some(unit.into()),
        normal_range: Some(range.into()),
        result_summary: None,
        status: Some("completed".into()),
        notes: Some("Nhịn ăn 8 giờ trước khi lấy máu".into()),
        performed_at: Some(now - Duration::days(days_ago)),
        created_at: now - Duration::days(days_ago),
    };
    let lab_results = vec![
        lab("lab-1", 3, "LDL Cholesterol", 4.1, "mmol/L", "< 3.4"),
        lab("lab-2", 12, "Glucose", 5.4, "mmol/L", "3.9 - 6.4"),
        lab("lab-3", 200, "HbA1c", 5.6, "%", "< 5.7"),
    ];

    let visit_at = now - Duration::days(12);
    let prescriptions = vec![Prescription {
        id: "rx-1".into(),
        patient_id: p.patient_id.into(),
        medication: "Atorvastatin".into(),
        dosage: Some("20mg".into()),
        frequency: Some("1 lần/ngày".into()),
        duration: Some("30 ngày".into()),
        instructions: Some("Uống sau bữa tối".into()),
        created_at: visit_at,
        consultation: ConsultationRef {
            id: "visit-1".into(),
            created_at: visit_at,
            diagnosis: Some("Rối loạn mỡ máu".into()),
            status: Some("COMPLETED".into()),
        },
    }];
    let visits = vec![Consultation {
        id: "visit-1".into(),
        patient_id: p.patient_id.into(),
        created_at: visit_at,
        status: Some("COMPLETED".into()),
        diagnosis: Some("Rối loạn mỡ máu".into()),
        notes: Some("Tái khám sau 1 tháng".into()),
        next_appointment: Some(now + Duration::days(18)),
    }];
    let vital_signs = vec![VitalSign {
        id: "vs-1".into(),
        patient_id: p.patient_id.into(),
        kind: "blood_pressure".into(),
        value: None,
        systolic: Some(135.0),
        diastolic: Some(85.0),
        heart_rate: Some(72.0),
        glucose: None,
        spo2: None,
        temperature: None,
        weight: None,
        unit: Some("mmHg".into()),
        status: Some("normal".into()),
        notes: None,
        timestamp: now - Duration::days(1),
    }];
    let medical_files = vec![MedicalFile {
        id: "file-1".into(),
        patient_id: p.patient_id.into(),
        name: "xquang-nguc.pdf".into(),
        kind: Some("imaging".into()),
        url: Some("https://files.example.com/pat-1/xquang-nguc.pdf".into()),
        uploaded_at: now - Duration::days(40),
    }];

    Arc::new(InMemoryRecordStore::new(RecordSet {
        patients,
        lab_results,
        prescriptions,
        visits,
        vital_signs,
        medical_files,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carebot_db::PatientRecordStore;

    #[tokio::test]
    async fn test_seeded_users_resolve() {
        let store = seeded_store();
        let patient = store.find_patient_by_user("user-1").await.unwrap().unwrap();
        assert_eq!(patient.full_name, SEED_PATIENT.full_name);
        assert!(store.find_patient_by_user("user-2").await.unwrap().is_some());
        assert!(store.find_patient_by_user("nobody").await.unwrap().is_none());
    }
}
