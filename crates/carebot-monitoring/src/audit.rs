//! Audit log service: typed helpers over an [`AuditStore`].
//!
//! Each helper builds one entry and appends it. Entries at CRITICAL or
//! with PII detected are also passed to the [`AlertNotifier`].

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use carebot_common::RiskLevel;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alerts::{AlertNotifier, SecurityAlert};
use crate::entry::{AuditLogEntry, NewAuditEntry};
use crate::error::{AuditError, Result};
use crate::telemetry;
use crate::store::{AuditStore, DateWindow};

pub const GENERATIVE_CALL_ACTION: &str = "GEMINI_API_CALL";

/// Worst-case PII assumed present whenever patient records are read.
const DB_PII_TYPES: [&str; 2] = ["PATIENT_NAME", "MEDICAL_RECORD_NUMBER"];

const CSV_HEADERS: [&str; 11] = [
    "log_id",
    "session_id",
    "user_id",
    "action",
    "db_accessed",
    "db_collection",
    "pii_detected",
    "pii_types",
    "safety_level",
    "timestamp",
    "ip_address",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AuditError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub total_interactions: usize,
    pub db_accesses: usize,
    pub pii_detections: usize,
    pub safety_alerts: usize,
    pub unique_users: usize,
    pub generative_calls: usize,
}

pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    notifier: Arc<dyn AlertNotifier>,
    clock: fn() -> DateTime<Utc>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>, notifier: Arc<dyn AlertNotifier>) -> Self {
        Self { store, notifier, clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    // ── Append ────────────────────────────────────────────────────────────────

    /// Append one entry, raising an alert when required.
    pub async fn log_interaction(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        let entry = entry.stamp(Uuid::new_v4(), (self.clock)());
        self.store.append(entry.clone()).await?;
        telemetry::record_audit_entry(entry.safety_level);

        tracing::debug!(
            log_id = %entry.log_id,
            session_id = %entry.session_id,
            action = %entry.action,
            db_accessed = entry.db_accessed,
            pii_detected = entry.pii_detected,
            safety_level = %entry.safety_level,
            "Audit entry appended"
        );

        if entry.requires_alert() {
            telemetry::record_security_alert();
            self.notifier.notify(SecurityAlert::from(&entry)).await;
        }
        Ok(entry)
    }

    pub async fn log_database_access(
        &self,
        session_id: &str,
        user_id: &str,
        collection: &str,
        record_count: usize,
        ip_address: Option<&str>,
    ) -> Result<AuditLogEntry> {
        tracing::debug!(session_id, collection, record_count, "Patient records read");
        let entry = NewAuditEntry::new(session_id, format!("DB_ACCESS: {collection}"), RiskLevel::Medium)
            .user(Some(user_id))
            .db(Some(collection))
            .pii(DB_PII_TYPES)
            .ip(ip_address);
        self.log_interaction(entry).await
    }

    pub async fn log_pii_detection(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        pii_types: &[String],
        context: &str,
        ip_address: Option<&str>,
    ) -> Result<AuditLogEntry> {
        let entry = NewAuditEntry::new(session_id, format!("PII_DETECTED: {context}"), RiskLevel::High)
            .user(user_id)
            .pii(pii_types.iter().cloned())
            .ip(ip_address);
        self.log_interaction(entry).await
    }

    pub async fn log_safety_alert(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        risk_level: RiskLevel,
        detected_issues: &[String],
        ip_address: Option<&str>,
    ) -> Result<AuditLogEntry> {
        let entry = NewAuditEntry::new(
            session_id,
            format!("SAFETY_ALERT: {}", detected_issues.join(", ")),
            risk_level,
        )
        .user(user_id)
        .ip(ip_address);
        self.log_interaction(entry).await
    }

    /// The prompt itself is never recorded.
    pub async fn log_generative_call(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        pii_removed: bool,
        ip_address: Option<&str>,
    ) -> Result<AuditLogEntry> {
        let level = if pii_removed { RiskLevel::Low } else { RiskLevel::High };
        let mut entry = NewAuditEntry::new(session_id, GENERATIVE_CALL_ACTION, level)
            .user(user_id)
            .ip(ip_address);
        entry.pii_detected = !pii_removed;
        self.log_interaction(entry).await
    }

    pub async fn log_auth_failure(
        &self,
        session_id: &str,
        reason: &str,
        ip_address: Option<&str>,
    ) -> Result<AuditLogEntry> {
        let entry = NewAuditEntry::new(session_id, format!("AUTH_FAILURE: {reason}"), RiskLevel::Medium)
            .ip(ip_address);
        self.log_interaction(entry).await
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub async fn session_logs(&self, session_id: &str) -> Result<Vec<AuditLogEntry>> {
        self.store.by_session(session_id).await
    }

    pub async fn user_logs(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditLogEntry>> {
        self.store.by_user(user_id, checked_window(from, to)?).await
    }

    pub async fn high_risk_logs(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        self.store.high_risk(limit).await
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    pub async fn anonymize_old_logs(&self, older_than_days: u32) -> Result<usize> {
        let cutoff = (self.clock)() - Duration::days(i64::from(older_than_days));
        let count = self.store.anonymize_before(cutoff).await?;
        tracing::info!(older_than_days, count, "Audit entries anonymized");
        Ok(count)
    }

    pub async fn delete_old_logs(&self, older_than_days: u32) -> Result<usize> {
        let cutoff = (self.clock)() - Duration::days(i64::from(older_than_days));
        let count = self.store.delete_before(cutoff).await?;
        tracing::info!(older_than_days, count, "Audit entries deleted");
        Ok(count)
    }

    // ── Export / reporting ────────────────────────────────────────────────────

    pub async fn export_logs(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        format: ExportFormat,
    ) -> Result<String> {
        let entries = self.store.in_window(checked_window(Some(from), Some(to))?).await?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&entries)?),
            ExportFormat::Csv => to_csv(&entries),
        }
    }

    pub async fn compliance_report(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<ComplianceReport> {
        let entries = self.store.in_window(checked_window(Some(from), Some(to))?).await?;
        let unique_users: HashSet<&str> = entries.iter().filter_map(|e| e.user_id.as_deref()).collect();

        Ok(ComplianceReport {
            total_interactions: entries.len(),
            db_accesses: entries.iter().filter(|e| e.db_accessed).count(),
            pii_detections: entries.iter().filter(|e| e.pii_detected).count(),
            safety_alerts: entries
                .iter()
                .filter(|e| matches!(e.safety_level, RiskLevel::Critical | RiskLevel::High))
                .count(),
            unique_users: unique_users.len(),
            generative_calls: entries.iter().filter(|e| e.action == GENERATIVE_CALL_ACTION).count(),
        })
    }
}

fn checked_window(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<DateWindow> {
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(AuditError::InvalidRange { from: f, to: t });
        }
    }
    Ok(DateWindow { from, to })
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}

fn to_csv(entries: &[AuditLogEntry]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;
    for e in entries {
        let log_id = e.log_id.to_string();
        let pii_types = e.pii_types.as_ref().map(|t| t.join(";")).unwrap_or_default();
        let timestamp = e.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        writer.write_record([
            log_id.as_str(),
            e.session_id.as_str(),
            e.user_id.as_deref().unwrap_or(""),
            e.action.as_str(),
            yes_no(e.db_accessed),
            e.db_collection.as_deref().unwrap_or(""),
            yes_no(e.pii_detected),
            pii_types.as_str(),
            e.safety_level.as_str(),
            timestamp.as_str(),
            e.ip_address.as_deref().unwrap_or(""),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| AuditError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AuditError::Export(e.to_string()))
}
