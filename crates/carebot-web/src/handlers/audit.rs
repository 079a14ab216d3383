//! Audit tooling routes. Admin principals only.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use carebot_monitoring::{AuditLogEntry, ComplianceReport, ExportFormat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{principal, BearerHeader};
use crate::error::ApiError;
use crate::state::{AppState, SharedState};

fn require_admin(state: &AppState, bearer: BearerHeader) -> Result<String, ApiError> {
    match principal(state, bearer) {
        Some(p) if p.admin => Ok(p.user_id),
        Some(p) => {
            tracing::warn!(user_id = %p.user_id, "Non-admin attempted audit access");
            Err(ApiError::Forbidden)
        }
        None => Err(ApiError::Forbidden),
    }
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceBody {
    pub anonymize_after_days: Option<u32>,
    pub retention_days: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MaintenanceSummary {
    pub anonymized: usize,
    pub deleted: usize,
}

/// GET /api/audit/export?from&to&format=json|csv
pub async fn export(
    State(state): State<SharedState>,
    bearer: BearerHeader,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = require_admin(&state, bearer)?;
    let format: ExportFormat = match query.format.as_deref() {
        Some(f) => f.parse()?,
        None => ExportFormat::default(),
    };
    let body = state.audit.export_logs(query.from, query.to, format).await?;
    tracing::info!(admin = %admin, format = ?format, bytes = body.len(), "Audit log exported");

    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Csv => "text/csv; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

/// GET /api/audit/high-risk?limit=N
pub async fn high_risk(
    State(state): State<SharedState>,
    bearer: BearerHeader,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    require_admin(&state, bearer)?;
    let limit = query.limit.unwrap_or(state.audit_config.high_risk_limit);
    Ok(Json(state.audit.high_risk_logs(limit).await?))
}

/// GET /api/audit/report?from&to
pub async fn report(
    State(state): State<SharedState>,
    bearer: BearerHeader,
    Query(query): Query<RangeQuery>,
) -> Result<Json<ComplianceReport>, ApiError> {
    require_admin(&state, bearer)?;
    Ok(Json(state.audit.compliance_report(query.from, query.to).await?))
}

/// GET /api/audit/sessions/{session_id}
pub async fn session(
    State(state): State<SharedState>,
    bearer: BearerHeader,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    require_admin(&state, bearer)?;
    Ok(Json(state.audit.session_logs(&session_id).await?))
}

/// POST /api/audit/maintenance
///
/// Anonymizes, then deletes. Omitted fields fall back to the `[audit]`
/// config section.
pub async fn maintenance(
    State(state): State<SharedState>,
    bearer: BearerHeader,
    Json(body): Json<MaintenanceBody>,
) -> Result<Json<MaintenanceSummary>, ApiError> {
    let admin = require_admin(&state, bearer)?;
    let anonymize_after = body.anonymize_after_days.unwrap_or(state.audit_config.anonymize_after_days);
    let retention = body.retention_days.unwrap_or(state.audit_config.retention_days);

    let anonymized = state.audit.anonymize_old_logs(anonymize_after).await?;
    let deleted = state.audit.delete_old_logs(retention).await?;
    tracing::info!(admin = %admin, anonymized, deleted, "Audit maintenance run");
    Ok(Json(MaintenanceSummary { anonymized, deleted }))
}
