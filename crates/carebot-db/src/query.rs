//! Medical record query service.
//!
//! Maps a [`RecordQuerySpec`] onto one category read (or the combined
//! "all" digest) for the patient behind a user id. An unknown user yields
//! an empty, successful result rather than an error.

use crate::error::Result;
use crate::records::ClinicalRecord;
use crate::store::{PatientRecordStore, RecordFilter, TimeRange};
use carebot_common::{RecordCategory, RecordQuerySpec, TimeFrame};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub collection: RecordCategory,
    pub count: usize,
    pub time_range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub data: Value,
    pub metadata: QueryMetadata,
    /// Pre-sanitization payload. Only ever handed to the PII sanitizer.
    pub raw_data: Value,
}

impl QueryResult {
    pub fn empty(collection: RecordCategory, time_frame: TimeFrame) -> Self {
        Self {
            success: true,
            data: json!([]),
            metadata: QueryMetadata {
                collection,
                count: 0,
                time_range: time_frame.label().to_string(),
            },
            raw_data: json!([]),
        }
    }

    fn from_records<R: ClinicalRecord>(records: &[R], time_frame: TimeFrame) -> Result<Self> {
        let data = serde_json::to_value(records)?;
        Ok(Self {
            success: true,
            raw_data: data.clone(),
            data,
            metadata: QueryMetadata {
                collection: R::CATEGORY,
                count: records.len(),
                time_range: time_frame.label().to_string(),
            },
        })
    }
}

/// Resolve a time frame relative to `now`. `None` means unbounded.
pub fn resolve_time_range(
    frame: TimeFrame,
    specific_date: Option<&str>,
    now: DateTime<Utc>,
) -> Option<TimeRange> {
    match frame {
        TimeFrame::Latest | TimeFrame::LastWeek => Some(TimeRange::since(now - Duration::days(7))),
        TimeFrame::LastMonth => Some(TimeRange::since(now - Duration::days(30))),
        TimeFrame::LastYear => Some(TimeRange::since(now - Duration::days(365))),
        TimeFrame::SpecificDate => {
            let day = parse_day(specific_date?)?;
            let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
            let end = start + Duration::days(1) - Duration::milliseconds(1);
            Some(TimeRange { from: Some(start), to: Some(end) })
        }
        TimeFrame::All => None,
    }
}

/// UTC calendar day of an ISO-8601 date or datetime.
fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct MedicalRecordQueryService {
    store: Arc<dyn PatientRecordStore>,
    clock: Clock,
}

impl MedicalRecordQueryService {
    pub fn new(store: Arc<dyn PatientRecordStore>) -> Self {
        Self { store, clock: Arc::new(Utc::now) }
    }

    /// Fix "now" for relative time windows.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub async fn query(&self, spec: &RecordQuerySpec, user_id: &str) -> Result<QueryResult> {
        let Some(patient) = self.store.find_patient_by_user(user_id).await? else {
            tracing::debug!(category = spec.target_category.as_str(), "No patient profile for user");
            return Ok(QueryResult::empty(spec.target_category, spec.time_frame));
        };

        let filter = RecordFilter {
            range: resolve_time_range(spec.time_frame, spec.specific_date.as_deref(), (self.clock)()),
            keywords: spec.effective_keywords(),
            limit: spec.limit,
        };
        let pid = patient.id.as_str();
        let frame = spec.time_frame;

        let result = match spec.target_category {
            RecordCategory::LabResults => {
                QueryResult::from_records(&self.store.lab_results(pid, &filter).await?, frame)?
            }
            RecordCategory::Prescriptions => {
                QueryResult::from_records(&self.store.prescriptions(pid, &filter).await?, frame)?
            }
            RecordCategory::VisitHistory => {
                QueryResult::from_records(&self.store.visits(pid, &filter).await?, frame)?
            }
            RecordCategory::VitalSigns => {
                let filter = RecordFilter { keywords: vec![], ..filter };
                QueryResult::from_records(&self.store.vital_signs(pid, &filter).await?, frame)?
            }
            RecordCategory::MedicalFiles => {
                QueryResult::from_records(&self.store.medical_files(pid, &filter).await?, frame)?
            }
            RecordCategory::Allergies => {
                let items = patient.history_items();
                let data = serde_json::to_value(&items)?;
                QueryResult {
                    success: true,
                    raw_data: data.clone(),
                    data,
                    metadata: QueryMetadata {
                        collection: RecordCategory::Allergies,
                        count: items.len(),
                        time_range: TimeFrame::All.label().to_string(),
                    },
                }
            }
            RecordCategory::All => self.query_all(pid, filter, frame).await?,
        };

        tracing::debug!(
            category = result.metadata.collection.as_str(),
            count = result.metadata.count,
            "Record query complete"
        );
        Ok(result)
    }

    /// A fair share (limit / 3, at least 1) from labs, prescriptions and vitals,
    /// fetched concurrently.
    async fn query_all(&self, pid: &str, filter: RecordFilter, frame: TimeFrame) -> Result<QueryResult> {
        let slice = (filter.limit / 3).max(1);
        let shared = RecordFilter { limit: slice, ..filter };
        let vitals_filter = RecordFilter { keywords: vec![], ..shared.clone() };

        let (labs, prescriptions, vitals) = tokio::join!(
            self.store.lab_results(pid, &shared),
            self.store.prescriptions(pid, &shared),
            self.store.vital_signs(pid, &vitals_filter),
        );
        let (labs, prescriptions, vitals) = (labs?, prescriptions?, vitals?);

        let combined = json!({
            "lab_results": labs,
            "prescriptions": prescriptions,
            "vital_signs": vitals,
        });

        Ok(QueryResult {
            success: true,
            data: json!([combined.clone()]),
            metadata: QueryMetadata {
                collection: RecordCategory::All,
                count: labs.len() + prescriptions.len() + vitals.len(),
                time_range: frame.label().to_string(),
            },
            raw_data: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{LabResult, PatientProfile, VitalSign};
    use crate::store::{InMemoryRecordStore, RecordSet};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    fn lab(id: &str, kind: &str, age_days: i64) -> LabResult {
        LabResult {
            id: id.into(),
            patient_id: "pat-1".into(),
            kind: kind.into(),
            test_name: None,
            value: Some(5.5),
            unit: Some("mmol/L".into()),
            normal_range: None,
            result_summary: None,
            status: None,
            notes: None,
            performed_at: Some(days_ago(age_days)),
            created_at: days_ago(age_days),
        }
    }

    fn vital(id: &str, age_days: i64) -> VitalSign {
        VitalSign {
            id: id.into(),
            patient_id: "pat-1".into(),
            kind: "heart_rate".into(),
            value: None,
            systolic: None,
            diastolic: None,
            heart_rate: Some(72.0),
            glucose: None,
            spo2: None,
            temperature: None,
            weight: None,
            unit: Some("bpm".into()),
            status: None,
            notes: None,
            timestamp: days_ago(age_days),
        }
    }

    fn service() -> MedicalRecordQueryService {
        let set = RecordSet {
            patients: vec![PatientProfile {
                id: "pat-1".into(),
                user_id: "user-1".into(),
                full_name: "Nguyễn Văn An".into(),
                email: None,
                phone: None,
                address: None,
                date_of_birth: None,
                identification_number: None,
                medical_history: Some(" Dị ứng penicillin ".into()),
                conditions: vec!["Tăng huyết áp".into(), "  ".into()],
            }],
            lab_results: vec![lab("l1", "Glucose", 2), lab("l2", "HbA1c", 20), lab("l3", "LDL", 200)],
            vital_signs: vec![vital("v1", 1), vital("v2", 3), vital("v3", 40)],
            ..Default::default()
        };
        MedicalRecordQueryService::new(Arc::new(InMemoryRecordStore::new(set))).with_clock(now)
    }

    #[tokio::test]
    async fn test_unknown_user_gets_empty_result() {
        let spec = RecordQuerySpec::new(RecordCategory::LabResults, TimeFrame::LastMonth);
        let result = service().query(&spec, "ghost").await.unwrap();
        assert_eq!(result, QueryResult::empty(RecordCategory::LabResults, TimeFrame::LastMonth));
        assert_eq!(result.metadata.time_range, "last month");
    }

    #[tokio::test]
    async fn test_time_windows_filter_lab_results() {
        let svc = service();
        let week = svc
            .query(&RecordQuerySpec::new(RecordCategory::LabResults, TimeFrame::LastWeek), "user-1")
            .await
            .unwrap();
        assert_eq!(week.metadata.count, 1);

        let month = svc
            .query(&RecordQuerySpec::new(RecordCategory::LabResults, TimeFrame::LastMonth), "user-1")
            .await
            .unwrap();
        assert_eq!(month.metadata.count, 2);
        assert_eq!(month.data[0]["type"], "Glucose");

        let all = svc
            .query(&RecordQuerySpec::new(RecordCategory::LabResults, TimeFrame::All), "user-1")
            .await
            .unwrap();
        assert_eq!(all.metadata.count, 3);
        assert_eq!(all.raw_data, all.data);
    }

    #[tokio::test]
    async fn test_general_keyword_does_not_filter() {
        let spec = RecordQuerySpec::new(RecordCategory::LabResults, TimeFrame::All)
            .with_keywords(["general"]);
        let result = service().query(&spec, "user-1").await.unwrap();
        assert_eq!(result.metadata.count, 3);

        let spec = spec.with_keywords(["hba1c", "ldl"]);
        let result = service().query(&spec, "user-1").await.unwrap();
        assert_eq!(result.metadata.count, 2);
    }

    #[tokio::test]
    async fn test_specific_date_is_one_utc_day() {
        let mut spec = RecordQuerySpec::new(RecordCategory::VitalSigns, TimeFrame::SpecificDate);
        spec.specific_date = Some("2024-05-29".into());
        let result = service().query(&spec, "user-1").await.unwrap();
        assert_eq!(result.metadata.count, 1);
        assert_eq!(result.data[0]["id"], "v2");

        spec.specific_date = Some("not a date".into());
        let unbounded = service().query(&spec, "user-1").await.unwrap();
        assert_eq!(unbounded.metadata.count, 3);
    }

    #[tokio::test]
    async fn test_allergies_come_from_profile() {
        let spec = RecordQuerySpec::new(RecordCategory::Allergies, TimeFrame::LastWeek);
        let result = service().query(&spec, "user-1").await.unwrap();
        assert_eq!(result.metadata.count, 2);
        assert_eq!(result.metadata.time_range, "all time");
        assert_eq!(
            result.data,
            json!([
                { "type": "medicalHistory", "value": "Dị ứng penicillin" },
                { "type": "condition", "value": "Tăng huyết áp" }
            ])
        );
    }

    #[tokio::test]
    async fn test_all_category_takes_a_share_of_each() {
        let spec = RecordQuerySpec::new(RecordCategory::All, TimeFrame::All).with_limit(Some(6.0));
        let result = service().query(&spec, "user-1").await.unwrap();

        assert_eq!(result.metadata.collection, RecordCategory::All);
        assert_eq!(result.raw_data["lab_results"].as_array().map(Vec::len), Some(2));
        assert_eq!(result.raw_data["vital_signs"].as_array().map(Vec::len), Some(2));
        assert_eq!(result.metadata.count, 4);
        assert_eq!(result.data[0], result.raw_data);
    }

    #[test]
    fn test_resolve_time_range() {
        assert_eq!(resolve_time_range(TimeFrame::All, None, now()), None);
        assert_eq!(
            resolve_time_range(TimeFrame::Latest, None, now()),
            Some(TimeRange::since(days_ago(7)))
        );
        assert_eq!(resolve_time_range(TimeFrame::SpecificDate, None, now()), None);
        let day = resolve_time_range(TimeFrame::SpecificDate, Some("2024-05-10T22:30:00+07:00"), now())
            .unwrap();
        assert_eq!(day.from, Some(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()));
    }
}
