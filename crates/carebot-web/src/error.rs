//! HTTP error responses. Bodies always have the `ChatFailure` shape
//! `{success: false, error, message}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use carebot_agent::ChatFailure;
use carebot_common::{CarebotError, ErrorClass};
use carebot_monitoring::AuditError;

pub const INVALID_BODY: &str = "Yêu cầu không hợp lệ.";
pub const ADMIN_ONLY: &str = "Bạn không có quyền truy cập chức năng này.";

#[derive(Debug)]
pub enum ApiError {
    /// Already mapped by the orchestrator.
    Chat(ChatFailure),
    Pipeline(CarebotError),
    Forbidden,
}

impl From<ChatFailure> for ApiError {
    fn from(failure: ChatFailure) -> Self {
        ApiError::Chat(failure)
    }
}

impl From<CarebotError> for ApiError {
    fn from(err: CarebotError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        ApiError::Pipeline(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let failure = match self {
            ApiError::Chat(failure) => failure,
            ApiError::Pipeline(err) => {
                if err.class() == ErrorClass::Internal {
                    tracing::error!(error = %err, "Request failed");
                }
                ChatFailure::from(&err)
            }
            ApiError::Forbidden => ChatFailure::new(403, "FORBIDDEN", ADMIN_ONLY),
        };
        let status = StatusCode::from_u16(failure.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(failure)).into_response()
    }
}
