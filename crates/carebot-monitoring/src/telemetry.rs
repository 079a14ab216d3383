//! Pipeline counters over the `metrics` facade.
//!
//! Without an installed recorder every call here is a no-op, so library
//! code records unconditionally and only the binary installs the
//! Prometheus exporter.

use carebot_common::RiskLevel;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const CHAT_REQUESTS: &str = "carebot_chat_requests_total";
pub const CHAT_FAILURES: &str = "carebot_chat_failures_total";
pub const CHAT_LATENCY: &str = "carebot_chat_request_duration_seconds";
pub const AUDIT_ENTRIES: &str = "carebot_audit_entries_total";
pub const SECURITY_ALERTS: &str = "carebot_security_alerts_total";

pub fn record_chat_request(intent: &'static str, action: &'static str) {
    metrics::counter!(CHAT_REQUESTS, "intent" => intent, "action" => action).increment(1);
}

pub fn record_chat_failure(code: &'static str) {
    metrics::counter!(CHAT_FAILURES, "code" => code).increment(1);
}

pub fn observe_chat_latency(seconds: f64) {
    metrics::histogram!(CHAT_LATENCY).record(seconds);
}

pub fn record_audit_entry(level: RiskLevel) {
    metrics::counter!(AUDIT_ENTRIES, "safety_level" => level.as_str()).increment(1);
}

pub fn record_security_alert() {
    metrics::counter!(SECURITY_ALERTS).increment(1);
}

/// Install the process-wide Prometheus recorder. Call once, from `main`.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// A recorder handle that is not installed globally; renders an empty
/// exposition. Used where no exporter is wanted (tests, embedding).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
