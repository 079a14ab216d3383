//! Audit log entry model.

use carebot_common::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One security/safety-relevant event. Immutable once appended, except for
/// the anonymization sweep clearing `user_id` and `ip_address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub log_id: Uuid,
    pub session_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub db_accessed: bool,
    pub db_collection: Option<String>,
    pub pii_detected: bool,
    pub pii_types: Option<Vec<String>>,
    pub safety_level: RiskLevel,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
}

impl AuditLogEntry {
    /// CRITICAL/HIGH, or PII seen outside a database read.
    pub fn is_high_risk(&self) -> bool {
        matches!(self.safety_level, RiskLevel::Critical | RiskLevel::High)
            || (self.pii_detected && !self.db_accessed)
    }

    pub fn requires_alert(&self) -> bool {
        self.safety_level == RiskLevel::Critical || self.pii_detected
    }
}

/// Everything but the generated id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub session_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub db_accessed: bool,
    pub db_collection: Option<String>,
    pub pii_detected: bool,
    pub pii_types: Option<Vec<String>>,
    pub safety_level: RiskLevel,
    pub ip_address: Option<String>,
}

impl NewAuditEntry {
    pub fn new(session_id: impl Into<String>, action: impl Into<String>, safety_level: RiskLevel) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            action: action.into(),
            db_accessed: false,
            db_collection: None,
            pii_detected: false,
            pii_types: None,
            safety_level,
            ip_address: None,
        }
    }

    pub fn user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn ip(mut self, ip_address: Option<&str>) -> Self {
        self.ip_address = ip_address.map(str::to_string);
        self
    }

    pub fn db(mut self, collection: Option<&str>) -> Self {
        self.db_accessed = true;
        self.db_collection = collection.map(str::to_string);
        self
    }

    /// Mark PII as detected. An empty type list is stored as `None`.
    pub fn pii<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        self.pii_detected = true;
        self.pii_types = (!types.is_empty()).then_some(types);
        self
    }

    pub(crate) fn stamp(self, log_id: Uuid, timestamp: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            log_id,
            session_id: self.session_id,
            user_id: self.user_id,
            action: self.action,
            db_accessed: self.db_accessed,
            db_collection: self.db_collection,
            pii_detected: self.pii_detected,
            pii_types: self.pii_types,
            safety_level: self.safety_level,
            timestamp,
            ip_address: self.ip_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(entry: NewAuditEntry) -> AuditLogEntry {
        entry.stamp(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_high_risk_rules() {
        assert!(stamped(NewAuditEntry::new("s", "x", RiskLevel::High)).is_high_risk());
        assert!(!stamped(NewAuditEntry::new("s", "x", RiskLevel::Medium)).is_high_risk());

        let pii_only = NewAuditEntry::new("s", "x", RiskLevel::Low).pii(["EMAIL"]);
        assert!(stamped(pii_only.clone()).is_high_risk());
        assert!(!stamped(pii_only.db(Some("lab_results"))).is_high_risk());
    }

    #[test]
    fn test_alert_rules() {
        assert!(stamped(NewAuditEntry::new("s", "x", RiskLevel::Critical)).requires_alert());
        assert!(!stamped(NewAuditEntry::new("s", "x", RiskLevel::High)).requires_alert());
        assert!(stamped(NewAuditEntry::new("s", "x", RiskLevel::Low).pii(Vec::<String>::new())).requires_alert());
    }

    #[test]
    fn test_safety_level_serializes_upper_case() {
        let entry = stamped(NewAuditEntry::new("s", "CHAT", RiskLevel::Critical).user(Some("u1")));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["safety_level"], "CRITICAL");
        assert_eq!(json["user_id"], "u1");
        assert!(json["ip_address"].is_null());
    }
}
