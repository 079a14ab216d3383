//! Axum router: maps all URL paths to handlers.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{audit, chat, metrics::metrics};
use crate::sse::sse_handler;
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        // Chat
        .route("/api/chat/ask",    post(chat::ask))
        .route("/api/chat/health", get(chat::health))
        .route("/api/chat/tools",  get(chat::tools))

        // Audit tooling
        .route("/api/audit/export",               get(audit::export))
        .route("/api/audit/high-risk",            get(audit::high_risk))
        .route("/api/audit/report",               get(audit::report))
        .route("/api/audit/sessions/{session_id}", get(audit::session))
        .route("/api/audit/maintenance",          post(audit::maintenance))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        .route("/metrics", get(metrics))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
