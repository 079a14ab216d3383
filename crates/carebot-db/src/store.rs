//! Patient record store port and the in-memory implementation.
//!
//! The query service only reads; it never issues read-modify-write
//! sequences, so implementations need no app-level locking beyond their
//! own consistency guarantees.

use crate::error::Result;
use crate::records::{
    ClinicalRecord, Consultation, LabResult, MedicalFile, PatientProfile, Prescription, VitalSign,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use tokio::sync::RwLock;

/// Inclusive time window. Open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn since(from: DateTime<Utc>) -> Self {
        Self { from: Some(from), to: None }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |f| ts >= f) && self.to.map_or(true, |t| ts <= t)
    }
}

/// Bounded, parameterised read for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub range: Option<TimeRange>,
    /// Cleaned keywords, OR-matched case-insensitively.
    pub keywords: Vec<String>,
    pub limit: usize,
}

impl RecordFilter {
    pub fn matches<R: ClinicalRecord>(&self, record: &R) -> bool {
        let in_range = match &self.range {
            Some(range) => record.window_timestamps().into_iter().any(|ts| range.contains(ts)),
            None => true,
        };
        if !in_range {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }
        let fields: Vec<String> = record.keyword_fields().iter().map(|f| f.to_lowercase()).collect();
        self.keywords.iter().any(|kw| {
            let kw = kw.to_lowercase();
            fields.iter().any(|f| f.contains(&kw))
        })
    }

    /// Filter, order newest first, cap at `limit`.
    pub fn apply<'a, R, I>(&self, patient_id: &str, records: I) -> Vec<R>
    where
        R: ClinicalRecord + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let mut hits: Vec<R> = records
            .into_iter()
            .filter(|r| r.patient_id() == patient_id && self.matches(*r))
            .cloned()
            .collect();
        hits.sort_by_key(|r| Reverse(r.ordering_key()));
        hits.truncate(self.limit);
        hits
    }
}

#[async_trait]
pub trait PatientRecordStore: Send + Sync {
    async fn find_patient_by_user(&self, user_id: &str) -> Result<Option<PatientProfile>>;
    async fn lab_results(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<LabResult>>;
    async fn prescriptions(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<Prescription>>;
    async fn visits(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<Consultation>>;
    async fn vital_signs(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<VitalSign>>;
    async fn medical_files(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<MedicalFile>>;
}

/// Everything the in-memory store holds.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub patients: Vec<PatientProfile>,
    pub lab_results: Vec<LabResult>,
    pub prescriptions: Vec<Prescription>,
    pub visits: Vec<Consultation>,
    pub vital_signs: Vec<VitalSign>,
    pub medical_files: Vec<MedicalFile>,
}

/// Store backed by a [`RecordSet`] behind a `tokio` RwLock.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<RecordSet>,
}

impl InMemoryRecordStore {
    pub fn new(records: RecordSet) -> Self {
        Self { records: RwLock::new(records) }
    }

    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut RecordSet),
    {
        let mut guard = self.records.write().await;
        f(&mut guard);
    }
}

#[async_trait]
impl PatientRecordStore for InMemoryRecordStore {
    async fn find_patient_by_user(&self, user_id: &str) -> Result<Option<PatientProfile>> {
        let records = self.records.read().await;
        Ok(records.patients.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn lab_results(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<LabResult>> {
        Ok(filter.apply(patient_id, &self.records.read().await.lab_results))
    }

    async fn prescriptions(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<Prescription>> {
        Ok(filter.apply(patient_id, &self.records.read().await.prescriptions))
    }

    async fn visits(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<Consultation>> {
        Ok(filter.apply(patient_id, &self.records.read().await.visits))
    }

    async fn vital_signs(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<VitalSign>> {
        Ok(filter.apply(patient_id, &self.records.read().await.vital_signs))
    }

    async fn medical_files(&self, patient_id: &str, filter: &RecordFilter) -> Result<Vec<MedicalFile>> {
        Ok(filter.apply(patient_id, &self.records.read().await.medical_files))
    }
}
