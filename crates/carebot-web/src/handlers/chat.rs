//! Chat endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use carebot_agent::{ChatRequest, ChatbotResponse, ToolInfo};
use carebot_common::CarebotError;
use serde::Deserialize;

use super::{principal, BearerHeader};
use crate::auth::client_ip;
use crate::error::{ApiError, INVALID_BODY};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct AskBody {
    #[serde(default)]
    pub question: String,
    pub session_id: Option<String>,
}

/// POST /api/chat/ask
pub async fn ask(
    State(state): State<SharedState>,
    bearer: BearerHeader,
    headers: HeaderMap,
    body: Result<Json<AskBody>, JsonRejection>,
) -> Result<Json<ChatbotResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected chat body");
        CarebotError::BadRequest(INVALID_BODY.into())
    })?;

    let mut request = ChatRequest::new(body.question);
    if let Some(session_id) = body.session_id {
        request = request.session(session_id);
    }
    if let Some(principal) = principal(&state, bearer) {
        request = request.user(principal.user_id);
    }
    if let Some(ip) = client_ip(&headers) {
        request = request.ip(ip);
    }

    Ok(Json(state.orchestrator.ask(request).await?))
}

/// GET /api/chat/health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let report = state.orchestrator.health_report().await;
    let status = StatusCode::from_u16(report.http_status()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (status, Json(report))
}

/// GET /api/chat/tools
pub async fn tools(State(state): State<SharedState>) -> Json<Vec<ToolInfo>> {
    Json(state.orchestrator.tools())
}
