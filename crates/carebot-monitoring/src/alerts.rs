//! Security-team alert side channel.

use async_trait::async_trait;
use carebot_common::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::entry::AuditLogEntry;

/// Alert payload. Carries ids and labels only, never message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub log_id: Uuid,
    pub session_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub safety_level: RiskLevel,
    pub pii_detected: bool,
    pub pii_types: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl From<&AuditLogEntry> for SecurityAlert {
    fn from(entry: &AuditLogEntry) -> Self {
        Self {
            log_id: entry.log_id,
            session_id: entry.session_id.clone(),
            user_id: entry.user_id.clone(),
            action: entry.action.clone(),
            safety_level: entry.safety_level,
            pii_detected: entry.pii_detected,
            pii_types: entry.pii_types.clone(),
            timestamp: entry.timestamp,
        }
    }
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: SecurityAlert);
}

fn log_alert(alert: &SecurityAlert) {
    tracing::warn!(
        log_id = %alert.log_id,
        session_id = %alert.session_id,
        action = %alert.action,
        safety_level = %alert.safety_level,
        pii_detected = alert.pii_detected,
        "Security alert"
    );
}

/// Logs alerts at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, alert: SecurityAlert) {
        log_alert(&alert);
    }
}

/// Logs alerts and fans them out to subscribers (the SSE stream).
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<SecurityAlert>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SecurityAlert> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl AlertNotifier for BroadcastNotifier {
    async fn notify(&self, alert: SecurityAlert) {
        log_alert(&alert);
        // No subscribers is not an error.
        let _ = self.tx.send(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::NewAuditEntry;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        let entry = NewAuditEntry::new("s1", "SAFETY_ALERT: Chest pain", RiskLevel::Critical)
            .stamp(Uuid::new_v4(), Utc::now());

        notifier.notify(SecurityAlert::from(&entry)).await;
        let got = rx.recv().await.unwrap();
        assert_eq!(got.log_id, entry.log_id);
        assert_eq!(got.safety_level, RiskLevel::Critical);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(1);
        let entry = NewAuditEntry::new("s1", "x", RiskLevel::Critical).stamp(Uuid::new_v4(), Utc::now());
        notifier.notify(SecurityAlert::from(&entry)).await;
    }
}
