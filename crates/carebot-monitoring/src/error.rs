//! Audit log error types.

use carebot_common::CarebotError;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit store error: {0}")]
    Store(String),

    #[error("Invalid range: {from} is after {to}")]
    InvalidRange { from: DateTime<Utc>, to: DateTime<Utc> },

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AuditError> for CarebotError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::InvalidRange { .. } | AuditError::UnknownFormat(_) => {
                CarebotError::BadRequest(err.to_string())
            }
            other => CarebotError::Store(other.to_string()),
        }
    }
}
