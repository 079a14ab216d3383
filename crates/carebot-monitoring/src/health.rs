//! Aggregated upstream health report.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub classifier: ComponentHealth,
    pub generative: ComponentHealth,
}

impl HealthReport {
    pub fn new(classifier: ComponentHealth, generative: ComponentHealth) -> Self {
        let status = match (classifier.healthy, generative.healthy) {
            (true, true) => HealthStatus::Ok,
            (false, false) => HealthStatus::Unavailable,
            _ => HealthStatus::Degraded,
        };
        Self { status, classifier, generative }
    }

    pub fn http_status(&self) -> u16 {
        if self.status == HealthStatus::Ok { 200 } else { 503 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up() -> ComponentHealth {
        ComponentHealth { healthy: true, ..Default::default() }
    }

    #[test]
    fn test_status_aggregation() {
        assert_eq!(HealthReport::new(up(), up()).http_status(), 200);
        let degraded = HealthReport::new(up(), ComponentHealth::default());
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert_eq!(degraded.http_status(), 503);
        let down = HealthReport::new(ComponentHealth::default(), ComponentHealth::default());
        assert_eq!(serde_json::to_value(&down).unwrap()["status"], "unavailable");
    }
}
