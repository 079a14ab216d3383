use thiserror::Error;

/// Who is responsible for a failure. Drives the HTTP status and how much
/// detail the caller is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself was unacceptable (bad input, no auth, policy).
    Client,
    /// A remote collaborator (classifier, generative API) failed.
    Upstream,
    /// Anything else. Detail stays in server logs.
    Internal,
}

#[derive(Debug, Error)]
pub enum CarebotError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Service unavailable ({service}): {detail}")]
    ServiceUnavailable { service: String, detail: String },

    #[error("Bad gateway ({service}): {detail}")]
    BadGateway { service: String, detail: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CarebotError {
    pub fn service_unavailable(service: impl Into<String>, detail: impl Into<String>) -> Self {
        CarebotError::ServiceUnavailable { service: service.into(), detail: detail.into() }
    }

    pub fn bad_gateway(service: impl Into<String>, detail: impl Into<String>) -> Self {
        CarebotError::BadGateway { service: service.into(), detail: detail.into() }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CarebotError::BadRequest(_)
            | CarebotError::Unauthenticated(_)
            | CarebotError::PolicyViolation(_) => ErrorClass::Client,
            CarebotError::ServiceUnavailable { .. } | CarebotError::BadGateway { .. } => {
                ErrorClass::Upstream
            }
            CarebotError::Store(_)
            | CarebotError::Config(_)
            | CarebotError::Serialization(_)
            | CarebotError::Other(_) => ErrorClass::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            CarebotError::BadRequest(_) | CarebotError::PolicyViolation(_) => 400,
            CarebotError::Unauthenticated(_) => 401,
            CarebotError::BadGateway { .. } => 502,
            CarebotError::ServiceUnavailable { .. } => 503,
            _ => 500,
        }
    }

    /// Stable machine-readable code surfaced in failure bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CarebotError::BadRequest(_) => "BAD_REQUEST",
            CarebotError::Unauthenticated(_) => "UNAUTHORIZED",
            CarebotError::PolicyViolation(_) => "POLICY_VIOLATION",
            CarebotError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            CarebotError::BadGateway { .. } => "BAD_GATEWAY",
            _ => "INTERNAL_SERVER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CarebotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_errors_map_to_gateway_statuses() {
        let unavailable = CarebotError::service_unavailable("classifier", "timeout");
        let gateway = CarebotError::bad_gateway("generative", "HTTP 500");
        assert_eq!(unavailable.status_code(), 503);
        assert_eq!(gateway.status_code(), 502);
        assert_eq!(unavailable.class(), ErrorClass::Upstream);
        assert_eq!(gateway.class(), ErrorClass::Upstream);
    }

    #[test]
    fn test_policy_violation_is_client_error() {
        let err = CarebotError::PolicyViolation("injection".into());
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(err.code(), "POLICY_VIOLATION");
    }

    #[test]
    fn test_internal_errors_hide_behind_500() {
        let err = CarebotError::Other(anyhow::anyhow!("boom"));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.class(), ErrorClass::Internal);
    }
}
