//! Remote intent-classifier client.
//!
//! The classifier exposes `GET /health` and `POST /classify`. Every failure
//! on this path, transport or protocol, surfaces as
//! [`LlmError::Unavailable`] so the pipeline fails closed.

use crate::backend::{truncate_detail, LlmError};
use async_trait::async_trait;
use carebot_config::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of the classifier's health endpoint. All fields are optional on
/// the wire; the router decides what counts as healthy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierHealth {
    pub status: Option<String>,
    pub mode: Option<String>,
    pub model: Option<String>,
}

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn health(&self) -> Result<ClassifierHealth, LlmError>;
    /// Raw classification JSON for `input`. Validation happens in the router.
    async fn classify(&self, input: &str) -> Result<serde_json::Value, LlmError>;
    fn base_url(&self) -> &str;
}

pub struct HttpClassifier {
    base_url: String,
    health_timeout: Duration,
    classify_timeout: Duration,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            health_timeout: cfg.health_timeout(),
            classify_timeout: cfg.classify_timeout(),
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl ClassifierBackend for HttpClassifier {
    async fn health(&self) -> Result<ClassifierHealth, LlmError> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Classifier unreachable");
                LlmError::Unavailable("classifier unreachable".into())
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LlmError::Unavailable(format!(
                "classifier health check failed with status {}",
                status.as_u16()
            )));
        }

        resp.json::<ClassifierHealth>()
            .await
            .map_err(|_| LlmError::Unavailable("classifier health body is not valid JSON".into()))
    }

    async fn classify(&self, input: &str) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/classify", self.base_url);
        let resp = self.client
            .post(&url)
            .timeout(self.classify_timeout)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Classifier request failed");
                LlmError::Unavailable("classifier request failed".into())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let mut message = format!("classifier returned status {}", status.as_u16());
            if !body.is_empty() {
                message.push_str(": ");
                message.push_str(&truncate_detail(&body));
            }
            return Err(LlmError::Unavailable(message));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|_| LlmError::Unavailable("classifier returned invalid JSON".into()))
    }

    fn base_url(&self) -> &str { &self.base_url }
}
