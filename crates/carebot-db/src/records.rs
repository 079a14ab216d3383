//! Patient record models.
//!
//! Field names serialize in camelCase to match the portal's data store, so
//! the sanitizer's sensitive-key rules and the summarizer's field lookups
//! see the same shape the store returns.

use carebot_common::RecordCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub identification_number: Option<String>,
    pub medical_history: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabResult {
    pub id: String,
    pub patient_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub test_name: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub normal_range: Option<String>,
    pub result_summary: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub performed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Consultation fields embedded in a prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRef {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub diagnosis: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub medication: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub consultation: ConsultationRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: String,
    pub patient_id: String,
    pub created_at: DateTime<Utc>,
    pub status: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub next_appointment: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSign {
    pub id: String,
    pub patient_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Option<f64>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    pub glucose: Option<f64>,
    pub spo2: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub unit: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalFile {
    pub id: String,
    pub patient_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// One allergy / medical-history line taken from the patient profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl PatientProfile {
    /// Medical history followed by each non-blank condition.
    pub fn history_items(&self) -> Vec<HistoryItem> {
        let mut items = Vec::new();
        if let Some(history) = self.medical_history.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            items.push(HistoryItem { kind: "medicalHistory".into(), value: history.to_string() });
        }
        items.extend(
            self.conditions
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(|c| HistoryItem { kind: "condition".into(), value: c.to_string() }),
        );
        items
    }
}

// ── Query hooks ───────────────────────────────────────────────────────────────

/// What a category query needs to know about a record type.
pub trait ClinicalRecord: Clone + Serialize + Send + Sync {
    const CATEGORY: RecordCategory;

    fn patient_id(&self) -> &str;

    /// Timestamps tested against the time window; the record is in range
    /// when any of them is.
    fn window_timestamps(&self) -> Vec<DateTime<Utc>>;

    /// Newest-first ordering key. `None` sorts last.
    fn ordering_key(&self) -> (Option<DateTime<Utc>>, DateTime<Utc>);

    /// Text fields searched by keyword filters. Empty means keywords do not
    /// apply to this category.
    fn keyword_fields(&self) -> Vec<&str>;
}

impl ClinicalRecord for LabResult {
    const CATEGORY: RecordCategory = RecordCategory::LabResults;

    fn patient_id(&self) -> &str { &self.patient_id }

    fn window_timestamps(&self) -> Vec<DateTime<Utc>> {
        self.performed_at.into_iter().chain([self.created_at]).collect()
    }

    fn ordering_key(&self) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
        (self.performed_at, self.created_at)
    }

    fn keyword_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.kind.as_str()];
        fields.extend(
            [&self.test_name, &self.result_summary, &self.notes]
                .into_iter()
                .filter_map(|f| f.as_deref()),
        );
        fields
    }
}

impl ClinicalRecord for Prescription {
    const CATEGORY: RecordCategory = RecordCategory::Prescriptions;

    fn patient_id(&self) -> &str { &self.patient_id }

    fn window_timestamps(&self) -> Vec<DateTime<Utc>> {
        vec![self.consultation.created_at]
    }

    fn ordering_key(&self) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
        (Some(self.created_at), self.created_at)
    }

    fn keyword_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.medication.as_str()];
        fields.extend(
            [&self.dosage, &self.frequency, &self.duration, &self.instructions]
                .into_iter()
                .filter_map(|f| f.as_deref()),
        );
        fields
    }
}

impl ClinicalRecord for Consultation {
    const CATEGORY: RecordCategory = RecordCategory::VisitHistory;

    fn patient_id(&self) -> &str { &self.patient_id }

    fn window_timestamps(&self) -> Vec<DateTime<Utc>> {
        vec![self.created_at]
    }

    fn ordering_key(&self) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
        (Some(self.created_at), self.created_at)
    }

    fn keyword_fields(&self) -> Vec<&str> {
        [&self.diagnosis, &self.notes].into_iter().filter_map(|f| f.as_deref()).collect()
    }
}

impl ClinicalRecord for VitalSign {
    const CATEGORY: RecordCategory = RecordCategory::VitalSigns;

    fn patient_id(&self) -> &str { &self.patient_id }

    fn window_timestamps(&self) -> Vec<DateTime<Utc>> {
        vec![self.timestamp]
    }

    fn ordering_key(&self) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
        (Some(self.timestamp), self.timestamp)
    }

    fn keyword_fields(&self) -> Vec<&str> {
        Vec::new()
    }
}

impl ClinicalRecord for MedicalFile {
    const CATEGORY: RecordCategory = RecordCategory::MedicalFiles;

    fn patient_id(&self) -> &str { &self.patient_id }

    fn window_timestamps(&self) -> Vec<DateTime<Utc>> {
        vec![self.uploaded_at]
    }

    fn ordering_key(&self) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
        (Some(self.uploaded_at), self.uploaded_at)
    }

    fn keyword_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.kind.as_deref());
        fields
    }
}
