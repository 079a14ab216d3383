//! Aggregated upstream health, independent of the ask pipeline's own
//! health gate.

use carebot_llm::ClassifierStatus;
use carebot_monitoring::{ComponentHealth, HealthReport};

use crate::orchestrator::ChatOrchestrator;

impl ChatOrchestrator {
    /// Probe the classifier and the generative model concurrently.
    pub async fn health_report(&self) -> HealthReport {
        let (classifier, generative_ok) = tokio::join!(self.router.status(), self.generative.health_check());

        let generative = ComponentHealth {
            healthy: generative_ok,
            mode: None,
            model: Some(self.generative.model_id().to_string()),
            detail: None,
        };
        let report = HealthReport::new(classifier_health(classifier), generative);
        tracing::debug!(status = ?report.status, "Health report built");
        report
    }
}

fn classifier_health(status: ClassifierStatus) -> ComponentHealth {
    ComponentHealth { healthy: status.healthy, mode: status.mode, model: status.model, detail: status.detail }
}
