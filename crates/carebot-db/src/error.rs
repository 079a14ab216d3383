//! Database error types.

use carebot_common::CarebotError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Patient not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl From<DbError> for CarebotError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::InvalidQuery(msg) => CarebotError::BadRequest(msg),
            other => CarebotError::Store(other.to_string()),
        }
    }
}
