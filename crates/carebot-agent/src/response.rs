//! Request and response shapes of the chat pipeline.

use carebot_common::{Action, CarebotError, Intent, RiskLevel};
use serde::{Deserialize, Serialize};

use crate::templates;

/// One user question plus what the transport layer knows about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub question: String,
    pub session_id: Option<String>,
    /// Resolved by the caller's token verifier; `None` when anonymous.
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Default::default() }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub pii_removed: bool,
    pub db_accessed: bool,
    pub safety_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotResponse {
    pub success: bool,
    pub reply: String,
    pub confidence: f64,
    pub intent: Intent,
    pub action_taken: Action,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub session_id: String,
    pub metadata: ResponseMetadata,
}

/// Early exit from the pipeline, ready for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFailure {
    #[serde(skip)]
    pub status: u16,
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl ChatFailure {
    pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, success: false, error: error.into(), message: message.into() }
    }
}

impl From<&CarebotError> for ChatFailure {
    /// Client errors keep their message; everything else gets generic text.
    fn from(err: &CarebotError) -> Self {
        let message = match err {
            CarebotError::BadRequest(message) => message.clone(),
            CarebotError::Unauthenticated(_) => templates::LocalReply::NeedLogin.text().to_string(),
            CarebotError::PolicyViolation(_) => templates::POLICY_REFUSAL.to_string(),
            CarebotError::ServiceUnavailable { .. } => templates::AI_UNAVAILABLE.to_string(),
            CarebotError::BadGateway { .. } => templates::AI_BAD_GATEWAY.to_string(),
            _ => templates::INTERNAL_ERROR.to_string(),
        };
        Self::new(err.status_code(), err.code(), message)
    }
}
