//! carebot-monitoring: audit trail, security alerts and health reporting.
//!
//! The [`AuditLog`] is append-only and sits behind the [`AuditStore`] port;
//! [`InMemoryAuditStore`] is the reference store. Alerts go through
//! [`AlertNotifier`]; [`BroadcastNotifier`] feeds the web SSE stream.

pub mod alerts;
pub mod audit;
pub mod entry;
pub mod error;
pub mod health;
pub mod store;
pub mod telemetry;

pub use alerts::{AlertNotifier, BroadcastNotifier, SecurityAlert, TracingNotifier};
pub use audit::{AuditLog, ComplianceReport, ExportFormat, GENERATIVE_CALL_ACTION};
pub use entry::{AuditLogEntry, NewAuditEntry};
pub use error::{AuditError, Result};
pub use health::{ComponentHealth, HealthReport, HealthStatus};
pub use store::{AuditStore, DateWindow, InMemoryAuditStore};
