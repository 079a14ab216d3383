//! Carebot patient record access.
//!
//! Read-only access to patient records behind the [`PatientRecordStore`]
//! port, plus the [`MedicalRecordQueryService`] that turns a classified
//! record query into a bounded, parameterised result set.
//!
//! # Example
//!
//! ```rust,no_run
//! use carebot_common::{RecordCategory, RecordQuerySpec, TimeFrame};
//! use carebot_db::{InMemoryRecordStore, MedicalRecordQueryService, RecordSet};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), carebot_db::DbError> {
//! let store = Arc::new(InMemoryRecordStore::new(RecordSet::default()));
//! let service = MedicalRecordQueryService::new(store);
//! let spec = RecordQuerySpec::new(RecordCategory::LabResults, TimeFrame::LastMonth);
//! let result = service.query(&spec, "user-1").await?;
//! println!("{} records", result.metadata.count);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod query;
pub mod records;
pub mod store;

pub use error::{DbError, Result};
pub use query::{resolve_time_range, MedicalRecordQueryService, QueryMetadata, QueryResult};
pub use records::{
    ClinicalRecord, Consultation, ConsultationRef, HistoryItem, LabResult, MedicalFile,
    PatientProfile, Prescription, VitalSign,
};
pub use store::{InMemoryRecordStore, PatientRecordStore, RecordFilter, RecordSet, TimeRange};
