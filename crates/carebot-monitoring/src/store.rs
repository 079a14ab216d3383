//! Audit storage port and the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::entry::AuditLogEntry;
use crate::error::Result;

/// Inclusive timestamp window; open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from: Some(from), to: Some(to) }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |f| ts >= f) && self.to.map_or(true, |t| ts <= t)
    }
}

/// Append-only audit storage. Every read returns entries in insertion
/// order.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> Result<()>;
    async fn by_session(&self, session_id: &str) -> Result<Vec<AuditLogEntry>>;
    async fn by_user(&self, user_id: &str, window: DateWindow) -> Result<Vec<AuditLogEntry>>;
    /// The `limit` most recent high-risk entries.
    async fn high_risk(&self, limit: usize) -> Result<Vec<AuditLogEntry>>;
    async fn in_window(&self, window: DateWindow) -> Result<Vec<AuditLogEntry>>;
    /// Clear user and IP on entries older than `cutoff`; returns how many
    /// entries changed.
    async fn anonymize_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
    async fn len(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn by_session(&self, session_id: &str) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| e.session_id == session_id).cloned().collect())
    }

    async fn by_user(&self, user_id: &str, window: DateWindow) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.user_id.as_deref() == Some(user_id) && window.contains(e.timestamp))
            .cloned()
            .collect())
    }

    async fn high_risk(&self, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        let risky: Vec<&AuditLogEntry> = entries.iter().filter(|e| e.is_high_risk()).collect();
        let skip = risky.len().saturating_sub(limit);
        Ok(risky.into_iter().skip(skip).cloned().collect())
    }

    async fn in_window(&self, window: DateWindow) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| window.contains(e.timestamp)).cloned().collect())
    }

    async fn anonymize_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let mut count = 0;
        for entry in entries.iter_mut().filter(|e| e.timestamp < cutoff) {
            if entry.user_id.is_some() || entry.ip_address.is_some() {
                entry.user_id = None;
                entry.ip_address = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        Ok(before - entries.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
