//! LLM backend trait and the Gemini implementation.
//!
//! The generative service talks to [`LlmBackend`]; tests substitute a
//! scripted backend. Only `candidates[0].content.parts[0].text`,
//! `safetyRatings` and `finishReason` are read from the Gemini response.

use async_trait::async_trait;
use carebot_common::CarebotError;
use carebot_config::GenerativeConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream error bodies are cut to this many chars before being kept.
pub const MAX_ERROR_DETAIL_CHARS: usize = 500;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Backend cannot serve requests at all (unhealthy, unconfigured,
    /// contract violation). Never retried.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Bad gateway: {0}")]
    BadGateway(String),
    #[error("Prompt blocked by data policy: {0}")]
    PolicyBlocked(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Empty response from model")]
    EmptyResponse,
}

impl From<LlmError> for CarebotError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Unavailable(detail) => CarebotError::service_unavailable("ai", detail),
            LlmError::PolicyBlocked(detail) => CarebotError::PolicyViolation(detail),
            other => CarebotError::bad_gateway("generative", other.to_string()),
        }
    }
}

/// Request URLs are dropped from transport errors so query strings never
/// reach logs or response details.
impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Http(err.without_url())
    }
}

pub fn truncate_detail(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_DETAIL_CHARS) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    if status >= 400 {
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        return Err(LlmError::ApiError { status, message: truncate_detail(&message) });
    }
    Ok(resp.json().await?)
}

// ── Google Gemini ─────────────────────────────────────────────────────────────

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiBackend {
    pub api_url: String,
    pub model: String,
    api_key: Option<SecretString>,
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    safety_threshold: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn from_config(cfg: &GenerativeConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
        Ok(Self {
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            temperature: cfg.temperature,
            top_k: cfg.top_k,
            top_p: cfg.top_p,
            max_output_tokens: cfg.max_output_tokens,
            safety_threshold: cfg.safety_threshold.clone(),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Gemini `generateContent` body. System messages become
    /// `systemInstruction`; assistant turns map to role `model`.
    pub fn request_body(&self, req: &LlmRequest) -> serde_json::Value {
        let system_text: Vec<&str> = req.messages.iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content }]
                })
            })
            .collect();

        let safety_settings: Vec<serde_json::Value> = HARM_CATEGORIES.iter()
            .map(|c| serde_json::json!({ "category": c, "threshold": self.safety_threshold }))
            .collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "temperature":     req.temperature.unwrap_or(self.temperature),
                "topK":            self.top_k,
                "topP":            self.top_p,
                "maxOutputTokens": req.max_tokens.unwrap_or(self.max_output_tokens),
            },
            "safetySettings": safety_settings,
        });
        if !system_text.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system_text.join("\n\n") }]
            });
        }
        body
    }
}

pub fn parse_gemini_response(json: &serde_json::Value, model: &str) -> LlmResponse {
    let candidate = &json["candidates"][0];
    let safety_ratings = candidate["safetyRatings"]
        .as_array()
        .map(|ratings| {
            ratings
                .iter()
                .filter_map(|r| {
                    Some(SafetyRating {
                        category: r["category"].as_str().unwrap_or_default().to_string(),
                        probability: r["probability"].as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    LlmResponse {
        content: candidate["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: model.to_string(),
        prompt_tokens: json["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        finish_reason: candidate["finishReason"].as_str().map(str::to_string),
        safety_ratings,
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Err(LlmError::Unavailable("Gemini API key not configured".into()));
        };
        let model = req.model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/{}:generateContent", self.api_url, model);

        let resp = self.client
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&self.request_body(&req))
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        Ok(parse_gemini_response(&json, model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> GeminiBackend {
        GeminiBackend::from_config(&GenerativeConfig::default()).unwrap()
    }

    #[test]
    fn test_gemini_backend_is_remote() {
        let b = backend();
        assert!(!b.is_local());
        assert_eq!(b.model_id(), "gemini-1.5-flash-latest");
        assert!(!b.is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_key_is_unavailable() {
        let req = LlmRequest { messages: vec![Message::user("hi")], model: None, max_tokens: None, temperature: None };
        let err = backend().complete(req).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_transport_error_never_carries_api_key() {
        let cfg = GenerativeConfig {
            api_url: "http://127.0.0.1:1/v1beta/models".into(),
            api_key: Some(SecretString::from("SECRETKEY123")),
            ..GenerativeConfig::default()
        };
        let req = LlmRequest { messages: vec![Message::user("hi")], model: None, max_tokens: None, temperature: None };
        let err = GeminiBackend::from_config(&cfg).unwrap().complete(req).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_)));

        let mapped = CarebotError::from(err).to_string();
        assert!(!mapped.contains("SECRETKEY123"), "{mapped}");
    }

    #[test]
    fn test_request_body_shape() {
        let req = LlmRequest {
            messages: vec![Message::system("Bạn là trợ lý y tế AI."), Message::user("Sốt là gì?")],
            model: None,
            max_tokens: None,
            temperature: Some(0.5),
        };
        let body = backend().request_body(&req);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Bạn là trợ lý y tế AI.");
        assert_eq!(body["contents"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["temperature"], json!(0.5));
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(body["safetySettings"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["safetySettings"][3]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn test_parse_gemini_response() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Sốt là phản ứng của cơ thể [1]." }] },
                "finishReason": "STOP",
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "LOW" },
                    { "category": "HARM_CATEGORY_HARASSMENT" }
                ]
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 30 }
        });
        let resp = parse_gemini_response(&raw, "gemini-test");
        assert_eq!(resp.content, "Sốt là phản ứng của cơ thể [1].");
        assert_eq!(resp.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(resp.safety_ratings.len(), 1);
        assert_eq!(resp.completion_tokens, 30);

        let empty = parse_gemini_response(&json!({}), "gemini-test");
        assert!(empty.content.is_empty());
    }

    #[test]
    fn test_truncate_detail_respects_char_boundaries() {
        let long = "ệ".repeat(600);
        let cut = truncate_detail(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_DETAIL_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_detail("short"), "short");
    }

    #[test]
    fn test_error_mapping_to_pipeline_errors() {
        let unavailable: CarebotError = LlmError::Unavailable("degraded".into()).into();
        assert_eq!(unavailable.status_code(), 503);
        let empty: CarebotError = LlmError::EmptyResponse.into();
        assert_eq!(empty.status_code(), 502);
        let api: CarebotError = LlmError::ApiError { status: 500, message: "boom".into() }.into();
        assert_eq!(api.status_code(), 502);
    }
}
