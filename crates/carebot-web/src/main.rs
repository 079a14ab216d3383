//! carebot server
//!
//! Run with: cargo run -p carebot-web --bin carebot

use std::sync::Arc;
use std::time::Duration;

use carebot_agent::{ChatOrchestrator, Collaborators, PipelineOptions};
use carebot_config::ChatbotConfig;
use carebot_db::{InMemoryRecordStore, RecordSet};
use carebot_llm::{GeminiBackend, HttpClassifier};
use carebot_monitoring::{telemetry, AuditLog, BroadcastNotifier, InMemoryAuditStore};
use carebot_web::auth::StaticTokens;
use carebot_web::router::build_router;
use carebot_web::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ALERT_CHANNEL_CAPACITY: usize = 256;
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,carebot=debug")),
        )
        .init();

    info!("Starting carebot...");
    let config = ChatbotConfig::load()?;
    let metrics = telemetry::install_prometheus()?;

    let classifier = Arc::new(HttpClassifier::from_config(&config.classifier)?);
    let llm = Arc::new(GeminiBackend::from_config(&config.generative)?);
    if !llm.is_configured() {
        warn!("GEMINI_API_KEY is not set; generative answers will fail with 502");
    }

    let alerts = BroadcastNotifier::new(ALERT_CHANNEL_CAPACITY);
    let audit = Arc::new(AuditLog::new(Arc::new(InMemoryAuditStore::new()), Arc::new(alerts.clone())));

    // Patient records are served by the external data layer; the in-memory
    // store starts empty.
    let records = Arc::new(InMemoryRecordStore::new(RecordSet::default()));

    let orchestrator = ChatOrchestrator::new(
        Collaborators { classifier, llm, records, audit: audit.clone() },
        PipelineOptions::from_config(&config),
    );

    spawn_audit_maintenance(audit.clone(), config.audit.anonymize_after_days, config.audit.retention_days);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        audit,
        tokens: Arc::new(StaticTokens::from_config(&config.auth)),
        alerts,
        metrics,
        audit_config: config.audit.clone(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Daily anonymize + retention sweep over the audit log.
fn spawn_audit_maintenance(audit: Arc<AuditLog>, anonymize_after_days: u32, retention_days: u32) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = audit.anonymize_old_logs(anonymize_after_days).await {
                warn!(error = %e, "Audit anonymization failed");
            }
            if let Err(e) = audit.delete_old_logs(retention_days).await {
                warn!(error = %e, "Audit retention sweep failed");
            }
        }
    });
}
