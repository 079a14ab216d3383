//! Shared application state for the web server.

use std::sync::Arc;

use carebot_agent::ChatOrchestrator;
use carebot_config::AuditConfig;
use carebot_monitoring::{AuditLog, BroadcastNotifier, SecurityAlert};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;

use crate::auth::TokenResolver;

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub audit: Arc<AuditLog>,
    pub tokens: Arc<dyn TokenResolver>,
    /// The notifier the audit log raises alerts on.
    pub alerts: BroadcastNotifier,
    pub metrics: PrometheusHandle,
    pub audit_config: AuditConfig,
}

impl AppState {
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityAlert> {
        self.alerts.subscribe()
    }
}

pub type SharedState = Arc<AppState>;
